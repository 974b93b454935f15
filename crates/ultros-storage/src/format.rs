//! File formats and the extension registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ini::Ini;
use serde_json::{Map, Value};

use crate::error::FormatError;
use crate::file::Document;

/// The two classes of storage file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// User-edited settings under the config directory.
    Config,
    /// Bot-maintained state under the data directory.
    Data,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::Data => "data",
        })
    }
}

/// A format driver: converts between file text and a mapping document.
pub trait StorageFormat: Send + Sync + 'static {
    /// Friendly format name, e.g. `"TOML"`.
    fn name(&self) -> &'static str;

    /// Parses file contents. The top level must be a mapping.
    fn parse(&self, text: &str) -> Result<Document, FormatError>;

    /// Renders a document as file contents.
    fn render(&self, document: &Document) -> Result<String, FormatError>;
}

pub struct JsonFormat;

impl StorageFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn parse(&self, text: &str) -> Result<Document, FormatError> {
        match serde_json::from_str(text)? {
            Value::Object(map) => Ok(map),
            other => Err(format!("top level must be an object, found {}", value_kind(&other)).into()),
        }
    }

    fn render(&self, document: &Document) -> Result<String, FormatError> {
        let mut text = serde_json::to_string_pretty(document)?;
        text.push('\n');
        Ok(text)
    }
}

pub struct TomlFormat;

impl StorageFormat for TomlFormat {
    fn name(&self) -> &'static str {
        "TOML"
    }

    fn parse(&self, text: &str) -> Result<Document, FormatError> {
        Ok(toml::from_str::<Map<String, Value>>(text)?)
    }

    fn render(&self, document: &Document) -> Result<String, FormatError> {
        Ok(toml::to_string_pretty(document)?)
    }
}

pub struct YamlFormat;

impl StorageFormat for YamlFormat {
    fn name(&self) -> &'static str {
        "YAML"
    }

    fn parse(&self, text: &str) -> Result<Document, FormatError> {
        let blank = text.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#') || line == "---"
        });
        if blank {
            return Ok(Map::new());
        }

        match serde_yaml::from_str(text)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(format!("top level must be a mapping, found {}", value_kind(&other)).into()),
        }
    }

    fn render(&self, document: &Document) -> Result<String, FormatError> {
        Ok(serde_yaml::to_string(document)?)
    }
}

/// INI files, as read by Python's `configparser` and most IRC bots.
///
/// Keys before the first section header sit at the top level, and every
/// `[section]` becomes an object. Values are always strings. Numbers and
/// booleans are written as text; arrays and deeper nesting cannot be written.
pub struct IniFormat;

impl StorageFormat for IniFormat {
    fn name(&self) -> &'static str {
        "INI"
    }

    fn parse(&self, text: &str) -> Result<Document, FormatError> {
        let ini = Ini::load_from_str(text)?;
        let mut document = Map::new();

        for (section, properties) in ini.iter() {
            let entries = properties
                .iter()
                .map(|(key, value)| (key.to_owned(), Value::String(value.to_owned())));
            match section {
                None => document.extend(entries),
                Some(name) => {
                    let table = document
                        .entry(name.to_owned())
                        .or_insert_with(|| Value::Object(Map::new()));
                    match table {
                        Value::Object(table) => table.extend(entries),
                        _ => {
                            return Err(format!("section [{name}] clashes with a top-level key").into());
                        }
                    }
                }
            }
        }
        Ok(document)
    }

    fn render(&self, document: &Document) -> Result<String, FormatError> {
        let mut ini = Ini::new();

        for (key, value) in document {
            if !matches!(value, Value::Object(_)) {
                ini.with_general_section().set(key.as_str(), ini_value(key, value)?);
            }
        }
        for (name, value) in document {
            let Value::Object(table) = value else {
                continue;
            };
            let mut section = ini.with_section(Some(name.as_str()));
            for (key, value) in table {
                section.set(key.as_str(), ini_value(key, value)?);
            }
        }

        let mut out = Vec::new();
        ini.write_to(&mut out)?;
        Ok(String::from_utf8(out)?)
    }
}

fn ini_value(key: &str, value: &Value) -> Result<String, FormatError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(format!("INI cannot store {} under '{key}'", value_kind(other)).into()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Registry
// =============================================================================

/// A registered format and the file kinds it may be used for.
#[derive(Clone)]
pub struct FormatEntry {
    pub driver: Arc<dyn StorageFormat>,
    pub config: bool,
    pub data: bool,
}

impl FormatEntry {
    /// A format usable for both config and data files.
    pub fn new(driver: impl StorageFormat) -> Self {
        Self {
            driver: Arc::new(driver),
            config: true,
            data: true,
        }
    }

    /// Restricts the entry to config files.
    pub fn config_only(mut self) -> Self {
        self.data = false;
        self
    }

    /// Restricts the entry to data files.
    pub fn data_only(mut self) -> Self {
        self.config = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn supports(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Config => self.config,
            FileKind::Data => self.data,
        }
    }
}

impl fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatEntry")
            .field("name", &self.name())
            .field("config", &self.config)
            .field("data", &self.data)
            .finish()
    }
}

/// Formats keyed by lowercase file extension.
///
/// | Extension | Format | Kinds |
/// |-----------|--------|-------|
/// | `json` | JSON | config, data |
/// | `toml` | TOML | config, data |
/// | `yaml`, `yml` | YAML | config, data |
/// | `ini`, `conf` | INI | config, data |
#[derive(Debug, Clone)]
pub struct FileFormats {
    extensions: HashMap<String, FormatEntry>,
}

impl Default for FileFormats {
    fn default() -> Self {
        let yaml = FormatEntry::new(YamlFormat);
        let mut extensions = HashMap::new();
        extensions.insert("json".to_owned(), FormatEntry::new(JsonFormat));
        extensions.insert("toml".to_owned(), FormatEntry::new(TomlFormat));
        extensions.insert("yaml".to_owned(), yaml.clone());
        extensions.insert("yml".to_owned(), yaml);
        let ini = FormatEntry::new(IniFormat);
        extensions.insert("ini".to_owned(), ini.clone());
        extensions.insert("conf".to_owned(), ini);
        Self { extensions }
    }
}

impl FileFormats {
    /// The built-in formats.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no formats.
    pub fn empty() -> Self {
        Self {
            extensions: HashMap::new(),
        }
    }

    /// Finds the format for `path`, returning the matched extension with it.
    ///
    /// `path` may also be a bare extension. Compound extensions are tried
    /// longest first: `file.a.b.c` checks `a.b.c`, then `b.c`, then `c`.
    pub fn get_format_from_path(&self, path: &str) -> Option<(String, &FormatEntry)> {
        let filename = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let mut extension = filename
            .split_once('.')
            .map_or(filename, |(_, rest)| rest)
            .to_lowercase();

        loop {
            if let Some(entry) = self.extensions.get(&extension) {
                return Some((extension, entry));
            }
            match extension.split_once('.') {
                Some((_, rest)) => extension = rest.to_owned(),
                None => return None,
            }
        }
    }

    /// Registers a format unless the extension is taken. Returns whether it
    /// was added.
    pub fn add_format(&mut self, extension: &str, entry: FormatEntry) -> bool {
        let extension = extension.to_lowercase();
        if self.extensions.contains_key(&extension) {
            return false;
        }
        self.extensions.insert(extension, entry);
        true
    }

    /// Removes a format. Returns whether it was registered.
    pub fn remove_format(&mut self, extension: &str) -> bool {
        self.extensions.remove(&extension.to_lowercase()).is_some()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<_> = self.extensions.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_compound_extension_lookup() {
        let mut formats = FileFormats::new();
        assert_eq!(formats.get_format_from_path("a/b/settings.TOML").unwrap().0, "toml");
        assert_eq!(formats.get_format_from_path("yml").unwrap().0, "yml");
        assert_eq!(formats.get_format_from_path("archive.tar.json").unwrap().0, "json");
        assert!(formats.get_format_from_path("notes.txt").is_none());
        assert!(formats.get_format_from_path("dir.json/README").is_none());

        assert!(formats.add_format("tar.json", FormatEntry::new(JsonFormat).data_only()));
        assert!(!formats.add_format("json", FormatEntry::new(JsonFormat)));
        let (extension, entry) = formats.get_format_from_path("archive.tar.json").unwrap();
        assert_eq!(extension, "tar.json");
        assert!(!entry.supports(FileKind::Config));

        assert!(formats.remove_format("TAR.JSON"));
        assert!(!formats.remove_format("tar.json"));
    }

    #[test]
    fn test_formats_parse_to_the_same_document() {
        let expected = json!({"name": "ultros", "channels": ["#a", "#b"], "port": 6667});

        let from_json = JsonFormat
            .parse(r##"{"name": "ultros", "channels": ["#a", "#b"], "port": 6667}"##)
            .unwrap();
        let from_toml = TomlFormat
            .parse("name = \"ultros\"\nchannels = [\"#a\", \"#b\"]\nport = 6667\n")
            .unwrap();
        let from_yaml = YamlFormat
            .parse("name: ultros\nchannels: ['#a', '#b']\nport: 6667\n")
            .unwrap();

        assert_eq!(Value::Object(from_json), expected);
        assert_eq!(Value::Object(from_toml), expected);
        assert_eq!(Value::Object(from_yaml), expected);
    }

    #[test]
    fn test_ini_sections_become_objects() {
        let document = IniFormat
            .parse("owner = gdude\n\n[irc]\nhost = irc.libera.chat\nport = 6667\n\n[irc]\ntls = no\n")
            .unwrap();
        assert_eq!(
            Value::Object(document),
            json!({
                "owner": "gdude",
                "irc": {"host": "irc.libera.chat", "port": "6667", "tls": "no"},
            })
        );
        assert_eq!(FileFormats::new().get_format_from_path("bot.conf").unwrap().1.name(), "INI");
    }

    #[test]
    fn test_ini_render_reads_back_as_strings() {
        let document = json!({"greeting": "hi there", "plugins": {"enabled": true, "limit": 5}});
        let Value::Object(document) = document else {
            unreachable!()
        };

        let text = IniFormat.render(&document).unwrap();
        assert!(text.contains("greeting=hi there"));
        assert!(text.contains("[plugins]"));

        let back = IniFormat.parse(&text).unwrap();
        assert_eq!(
            Value::Object(back),
            json!({"greeting": "hi there", "plugins": {"enabled": "true", "limit": "5"}})
        );
    }

    #[test]
    fn test_ini_rejects_unrepresentable_values() {
        let mut document = Map::new();
        document.insert("channels".into(), json!(["#a"]));
        assert!(IniFormat.render(&document).is_err());

        let mut document = Map::new();
        document.insert("deep".into(), json!({"inner": {"x": 1}}));
        assert!(IniFormat.render(&document).is_err());

        assert!(IniFormat.parse("irc = top\n[irc]\nhost = x\n").is_err());
    }

    #[test]
    fn test_non_mapping_documents_are_rejected() {
        assert!(JsonFormat.parse("[1, 2]").is_err());
        assert!(YamlFormat.parse("- a\n- b\n").is_err());
        assert!(YamlFormat.parse("# only a comment\n").unwrap().is_empty());
    }
}
