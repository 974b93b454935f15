//! The storage manager.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use ultros_core::OwnerId;

use crate::error::{StorageError, StorageResult};
use crate::file::StorageFile;
use crate::format::{FileFormats, FileKind, FormatEntry};

/// What to load when a config file does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DefaultsPath {
    /// Retry with `<path>.default`, in the same format.
    #[default]
    Auto,
    /// Fail with [`StorageError::FileNotFound`].
    Disabled,
    /// Retry once with this path, in the same format.
    Path(String),
}

/// Loads and caches config and data files.
///
/// Paths are relative to the config or data directory and are normalised
/// before use, so `a/./b.toml` and `a/c/../b.toml` share one cache entry.
pub struct StorageManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    formats: RwLock<FileFormats>,
    config_files: RwLock<HashMap<String, Arc<StorageFile>>>,
    data_files: RwLock<HashMap<String, Arc<StorageFile>>>,
}

impl StorageManager {
    /// Creates a manager with the built-in formats.
    pub fn new(config_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self::with_formats(config_dir, data_dir, FileFormats::new())
    }

    pub fn with_formats(
        config_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        formats: FileFormats,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            data_dir: data_dir.into(),
            formats: RwLock::new(formats),
            config_files: RwLock::new(HashMap::new()),
            data_files: RwLock::new(HashMap::new()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// See [`FileFormats::add_format`].
    pub fn add_format(&self, extension: &str, entry: FormatEntry) -> bool {
        self.formats.write().add_format(extension, entry)
    }

    /// See [`FileFormats::remove_format`].
    pub fn remove_format(&self, extension: &str) -> bool {
        self.formats.write().remove_format(extension)
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Returns the config file at `path`, loading it on first use.
    ///
    /// `fmt` overrides the format otherwise guessed from the extension. When
    /// the file does not exist, `defaults` decides what happens; a default
    /// file is loaded in the format resolved for `path` and cached under its
    /// own path.
    pub fn get_config(
        &self,
        path: &str,
        owner: Option<OwnerId>,
        fmt: Option<&str>,
        defaults: DefaultsPath,
    ) -> StorageResult<Arc<StorageFile>> {
        let key = normalize(path);
        if let Some(file) = self.config_files.read().get(&key) {
            return Ok(Arc::clone(file));
        }

        let (extension, entry) = self.resolve(&key, fmt, FileKind::Config)?;
        let opened = StorageFile::open(
            FileKind::Config,
            key.clone(),
            self.config_dir.join(&key),
            Arc::clone(&entry.driver),
            owner,
        );

        match opened {
            Ok(file) => Ok(self.cache(&self.config_files, key, file)),
            Err(err) if err.is_not_found() => match defaults {
                DefaultsPath::Auto => {
                    debug!(path = %key, "Config file missing, trying defaults");
                    self.get_config(
                        &format!("{key}.default"),
                        owner,
                        Some(&extension),
                        DefaultsPath::Disabled,
                    )
                }
                DefaultsPath::Path(defaults) => {
                    debug!(path = %key, defaults = %defaults, "Config file missing, trying defaults");
                    self.get_config(&defaults, owner, Some(&extension), DefaultsPath::Disabled)
                }
                DefaultsPath::Disabled => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Returns the data file at `path`, loading it on first use. A file that
    /// does not exist yet starts empty and is created on first save.
    pub fn get_data(
        &self,
        path: &str,
        owner: Option<OwnerId>,
        fmt: Option<&str>,
    ) -> StorageResult<Arc<StorageFile>> {
        let key = normalize(path);
        if let Some(file) = self.data_files.read().get(&key) {
            return Ok(Arc::clone(file));
        }

        let (_, entry) = self.resolve(&key, fmt, FileKind::Data)?;
        let file = StorageFile::open(
            FileKind::Data,
            key.clone(),
            self.data_dir.join(&key),
            Arc::clone(&entry.driver),
            owner,
        )?;
        Ok(self.cache(&self.data_files, key, file))
    }

    fn resolve(
        &self,
        key: &str,
        fmt: Option<&str>,
        kind: FileKind,
    ) -> StorageResult<(String, FormatEntry)> {
        let formats = self.formats.read();
        let (extension, entry) = formats
            .get_format_from_path(fmt.unwrap_or(key))
            .ok_or_else(|| StorageError::UnknownFormat {
                path: fmt.unwrap_or(key).to_owned(),
            })?;

        if !entry.supports(kind) {
            return Err(StorageError::UnsupportedFormat {
                format: entry.name(),
                kind,
            });
        }
        Ok((extension, entry.clone()))
    }

    /// Inserts unless another caller won the race, returning the cached handle.
    fn cache(
        &self,
        files: &RwLock<HashMap<String, Arc<StorageFile>>>,
        key: String,
        file: StorageFile,
    ) -> Arc<StorageFile> {
        Arc::clone(files.write().entry(key).or_insert_with(|| Arc::new(file)))
    }

    // =========================================================================
    // Unloading
    // =========================================================================

    /// Unloads a config file regardless of its owner. Returns whether it was loaded.
    pub fn unload_config(&self, path: &str) -> bool {
        let removed = self.config_files.write().remove(&normalize(path));
        removed.map(|file| release(&file)).is_some()
    }

    /// Unloads a data file regardless of its owner, saving unsaved changes
    /// first. Returns whether it was loaded.
    pub fn unload_data(&self, path: &str) -> bool {
        let removed = self.data_files.write().remove(&normalize(path));
        removed.map(|file| release(&file)).is_some()
    }

    /// Unloads every file loaded with `owner`. Returns whether any were.
    pub fn unload_for_owner(&self, owner: OwnerId) -> bool {
        let mut unloaded = 0;
        for files in [&self.config_files, &self.data_files] {
            let owned: Vec<Arc<StorageFile>> = {
                let mut files = files.write();
                let keys: Vec<String> = files
                    .iter()
                    .filter(|(_, file)| file.owner() == Some(owner))
                    .map(|(key, _)| key.clone())
                    .collect();
                keys.iter().filter_map(|key| files.remove(key)).collect()
            };
            unloaded += owned.len();
            owned.iter().for_each(release);
        }

        debug!(%owner, unloaded, "Unloaded storage files for owner");
        unloaded > 0
    }

    /// Unloads every file.
    pub fn unload_all(&self) {
        for files in [&self.config_files, &self.data_files] {
            let drained: Vec<_> = files.write().drain().map(|(_, file)| file).collect();
            drained.iter().for_each(release);
        }
    }

    /// Unloads everything, saving data files with unsaved changes.
    pub fn shutdown(&self) {
        self.unload_all();
        info!("Storage manager shut down");
    }

    /// Keys of loaded config files, sorted.
    pub fn loaded_configs(&self) -> Vec<String> {
        sorted_keys(&self.config_files)
    }

    /// Keys of loaded data files, sorted.
    pub fn loaded_data(&self) -> Vec<String> {
        sorted_keys(&self.data_files)
    }
}

fn release(file: &Arc<StorageFile>) {
    if file.kind() == FileKind::Data && file.is_dirty() {
        if let Err(err) = file.save() {
            warn!(path = %file.path().display(), error = %err, "Failed to save data file on unload");
        }
    }
    file.unload();
    debug!(kind = %file.kind(), key = %file.key(), "Unloaded storage file");
}

fn sorted_keys(files: &RwLock<HashMap<String, Arc<StorageFile>>>) -> Vec<String> {
    let mut keys: Vec<_> = files.read().keys().cloned().collect();
    keys.sort_unstable();
    keys
}

/// Folds `.` and `..` and joins with `/`. The result never escapes the root.
fn normalize(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn manager() -> (TempDir, StorageManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::new(dir.path().join("config"), dir.path().join("data"));
        fs::create_dir_all(manager.config_dir()).unwrap();
        (dir, manager)
    }

    fn write_config(manager: &StorageManager, path: &str, text: &str) {
        let full = manager.config_dir().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, text).unwrap();
    }

    #[test]
    fn test_second_get_config_returns_cached_handle() {
        let (_dir, manager) = manager();
        write_config(&manager, "bot.toml", "nick = \"ultros\"\n");

        let first = manager
            .get_config("bot.toml", None, None, DefaultsPath::Auto)
            .unwrap();
        // A changed file is not re-read while cached.
        write_config(&manager, "bot.toml", "nick = \"other\"\n");
        let second = manager
            .get_config("./bot.toml", None, None, DefaultsPath::Auto)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get("nick"), Some(json!("ultros")));

        second.reload().unwrap();
        assert_eq!(first.get("nick"), Some(json!("other")));
    }

    #[test]
    fn test_missing_config_falls_back_to_default_file() {
        let (_dir, manager) = manager();
        write_config(&manager, "networks/libera.toml.default", "host = \"irc.libera.chat\"\n");

        let config = manager
            .get_config("networks/libera.toml", None, None, DefaultsPath::Auto)
            .unwrap();
        assert_eq!(config.get("host"), Some(json!("irc.libera.chat")));
        assert_eq!(config.key(), "networks/libera.toml.default");
        assert_eq!(config.format_name(), "TOML");

        let err = manager
            .get_config("networks/libera.toml", None, None, DefaultsPath::Disabled)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_explicit_defaults_path() {
        let (_dir, manager) = manager();
        write_config(&manager, "templates/settings.yml", "greeting: hello\n");

        let config = manager
            .get_config(
                "settings.yml",
                None,
                None,
                DefaultsPath::Path("templates/settings.yml".into()),
            )
            .unwrap();
        assert_eq!(config.get("greeting"), Some(json!("hello")));

        // The defaults path is tried once, without a further fallback.
        let err = manager
            .get_config(
                "other.yml",
                None,
                None,
                DefaultsPath::Path("missing.yml".into()),
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_format_errors() {
        let (_dir, manager) = manager();
        let err = manager
            .get_config("notes.txt", None, None, DefaultsPath::Auto)
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownFormat { .. }));

        manager.add_format("cache", FormatEntry::new(crate::JsonFormat).data_only());
        let err = manager
            .get_config("state.cache", None, None, DefaultsPath::Auto)
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::UnsupportedFormat {
                kind: FileKind::Config,
                ..
            }
        ));

        write_config(&manager, "broken.json", "{ not json");
        let err = manager
            .get_config("broken.json", None, None, DefaultsPath::Auto)
            .unwrap_err();
        assert!(matches!(err, StorageError::Parse { format: "JSON", .. }));
    }

    #[test]
    fn test_explicit_format_overrides_extension() {
        let (_dir, manager) = manager();
        write_config(&manager, "settings.conf", "{\"a\": 1}");

        let config = manager
            .get_config("settings.conf", None, Some("json"), DefaultsPath::Disabled)
            .unwrap();
        assert_eq!(config.get_as::<u32>("a").unwrap(), Some(1));
    }

    #[test]
    fn test_modify_saves_on_ok_and_skips_on_err() {
        let (_dir, manager) = manager();
        let data = manager.get_data("plugins/seen.json", None, None).unwrap();
        assert!(data.is_empty());
        assert!(!data.path().exists());

        data.modify(|doc| {
            doc.insert("alice".into(), json!(3));
            Ok::<_, StorageError>(())
        })
        .unwrap();
        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(data.path()).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"alice": 3}));

        let result: Result<(), StorageError> = data.modify(|doc| {
            doc.insert("bob".into(), json!(1));
            Err(StorageError::UnknownFormat { path: "abort".into() })
        });
        assert!(result.is_err());
        assert!(!data.contains_key("bob"));
        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(data.path()).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"alice": 3}));
    }

    #[test]
    fn test_ini_config_and_data_files() {
        let (_dir, manager) = manager();
        write_config(&manager, "bot.conf", "[irc]\nnick = ultros\n");
        let config = manager
            .get_config("bot.conf", None, None, DefaultsPath::Auto)
            .unwrap();
        assert_eq!(config.format_name(), "INI");
        assert_eq!(config.get("irc"), Some(json!({"nick": "ultros"})));

        let data = manager.get_data("seen.ini", None, None).unwrap();
        data.modify(|doc| {
            doc.insert("alice".into(), json!({"seen": 3}));
            Ok::<_, StorageError>(())
        })
        .unwrap();
        assert!(fs::read_to_string(data.path()).unwrap().contains("[alice]"));

        data.reload().unwrap();
        assert_eq!(data.get("alice"), Some(json!({"seen": "3"})));
    }

    #[test]
    fn test_unload_for_owner_only_touches_owned_files() {
        let (_dir, manager) = manager();
        let plugin = OwnerId::new();
        let other = OwnerId::new();

        let owned = manager.get_data("a.json", Some(plugin), None).unwrap();
        manager.get_data("b.yaml", Some(other), None).unwrap();
        manager.get_data("c.toml", None, None).unwrap();

        owned.set("unsaved", true);
        assert!(manager.unload_for_owner(plugin));
        assert!(!manager.unload_for_owner(plugin));

        assert!(!owned.is_loaded());
        assert_eq!(manager.loaded_data(), vec!["b.yaml", "c.toml"]);
        // Unsaved data changes are written on unload.
        assert!(manager.data_dir().join("a.json").exists());

        assert!(manager.unload_data("c.toml"));
        assert!(!manager.unload_data("c.toml"));
        manager.shutdown();
        assert!(manager.loaded_data().is_empty());
    }

    #[test]
    fn test_typed_access() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Settings {
            nick: String,
            channels: Vec<String>,
        }

        let (_dir, manager) = manager();
        write_config(
            &manager,
            "bot.yaml",
            "nick: ultros\nchannels:\n  - '#ultros'\n",
        );
        let config = manager
            .get_config("bot.yaml", None, None, DefaultsPath::Auto)
            .unwrap();

        let settings: Settings = config.deserialize().unwrap();
        assert_eq!(settings.channels, vec!["#ultros"]);
        assert_eq!(config.set_default("port", 6667), json!(6667));
        assert_eq!(config.set_default("port", 1), json!(6667));
        assert!(config.get_as::<u16>("nick").is_err());

        let mut keys = config.keys();
        keys.sort();
        assert_eq!(keys, vec!["channels", "nick", "port"]);
    }

    #[test]
    fn test_normalize_folds_dots() {
        assert_eq!(normalize("a/./b/../c.toml"), "a/c.toml");
        assert_eq!(normalize("../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize("/abs/x.json"), "abs/x.json");
    }
}
