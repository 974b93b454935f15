//! # Ultros Storage
//!
//! Config and data files, loaded lazily and cached by path.
//!
//! ```text
//! get_config("networks/libera.toml")
//!        │
//!        ├─ cached? ─────────────────────────────▶ same Arc<StorageFile>
//!        ├─ format from extension (toml)
//!        ├─ <config_dir>/networks/libera.toml ───▶ parse, cache, return
//!        └─ not found
//!             ├─ DefaultsPath::Auto      ─▶ retry "networks/libera.toml.default" as toml
//!             ├─ DefaultsPath::Path(p)   ─▶ retry p as toml
//!             └─ DefaultsPath::Disabled  ─▶ StorageError::FileNotFound
//! ```
//!
//! Every file is presented as a mapping document (`serde_json::Map`) no
//! matter its on-disk format, so callers never depend on the format.
//!
//! ## Example
//!
//! ```rust,ignore
//! let storage = StorageManager::new("config", "data");
//!
//! let config = storage.get_config("plugins/greeter.toml", Some(owner), None, DefaultsPath::Auto)?;
//! let greeting: Option<String> = config.get_as("greeting")?;
//!
//! let data = storage.get_data("plugins/greeter.json", Some(owner), None)?;
//! data.modify(|doc| {
//!     doc.insert("greeted".into(), 1.into());
//!     Ok::<_, StorageError>(())
//! })?;
//! ```

mod error;
mod file;
mod format;
mod manager;

pub use error::{FormatError, StorageError, StorageResult};
pub use file::{Document, StorageFile};
pub use format::{
    FileFormats, FileKind, FormatEntry, IniFormat, JsonFormat, StorageFormat, TomlFormat,
    YamlFormat,
};
pub use manager::{DefaultsPath, StorageManager};
