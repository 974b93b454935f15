//! Loaded storage files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};
use ultros_core::OwnerId;

use crate::error::{StorageError, StorageResult};
use crate::format::{FileKind, StorageFormat};

/// The in-memory form of every storage file.
pub type Document = Map<String, Value>;

/// A loaded config or data file.
///
/// Handles are shared: the manager caches one per path and hands out clones
/// of the same `Arc`, so changes made through one are seen through all.
pub struct StorageFile {
    kind: FileKind,
    key: String,
    path: PathBuf,
    format: Arc<dyn StorageFormat>,
    owner: Option<OwnerId>,
    document: RwLock<Document>,
    loaded: AtomicBool,
    dirty: AtomicBool,
}

impl StorageFile {
    /// Reads and parses `path`. A missing data file starts out empty; a
    /// missing config file is [`StorageError::FileNotFound`].
    pub(crate) fn open(
        kind: FileKind,
        key: String,
        path: PathBuf,
        format: Arc<dyn StorageFormat>,
        owner: Option<OwnerId>,
    ) -> StorageResult<Self> {
        let document = match read_document(&path, format.as_ref()) {
            Ok(document) => document,
            Err(StorageError::FileNotFound { .. }) if kind == FileKind::Data => {
                debug!(path = %path.display(), "Data file does not exist yet, starting empty");
                Document::new()
            }
            Err(err) => return Err(err),
        };

        debug!(%kind, key = %key, format = format.name(), "Loaded storage file");
        Ok(Self {
            kind,
            key,
            path,
            format,
            owner,
            document: RwLock::new(document),
            loaded: AtomicBool::new(true),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Normalised path relative to the config or data directory.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Whether there are changes that have not been saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    // =========================================================================
    // Reading
    // =========================================================================

    pub fn get(&self, key: &str) -> Option<Value> {
        self.document.read().get(key).cloned()
    }

    /// Deserializes the value at `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        self.get(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|source| self.deserialize_error(source))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.document.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.document.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.document.read().values().cloned().collect()
    }

    pub fn items(&self) -> Vec<(String, Value)> {
        self.document
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.document.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.read().is_empty()
    }

    /// A copy of the whole document.
    pub fn snapshot(&self) -> Document {
        self.document.read().clone()
    }

    /// Deserializes the whole document, e.g. into a settings struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> StorageResult<T> {
        serde_json::from_value(Value::Object(self.snapshot()))
            .map_err(|source| self.deserialize_error(source))
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Sets `key`, returning the previous value. Not saved until [`save`](Self::save).
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let previous = self.document.write().insert(key.into(), value.into());
        self.mark_dirty();
        previous
    }

    /// Serializes `value` and sets it under `key`.
    pub fn set_serialized<T: Serialize>(&self, key: impl Into<String>, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value).map_err(|source| self.deserialize_error(source))?;
        self.set(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.document.write().remove(key);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// Returns the value at `key`, inserting `default` first if absent.
    pub fn set_default(&self, key: impl Into<String>, default: impl Into<Value>) -> Value {
        let mut document = self.document.write();
        let key = key.into();
        if let Some(existing) = document.get(&key) {
            return existing.clone();
        }
        let value = default.into();
        document.insert(key, value.clone());
        drop(document);
        self.mark_dirty();
        value
    }

    /// Inserts every pair of `other`, overwriting existing keys.
    pub fn update(&self, other: Document) {
        self.document.write().extend(other);
        self.mark_dirty();
    }

    pub fn clear(&self) {
        self.document.write().clear();
        self.mark_dirty();
    }

    /// Runs `f` on a working copy of the document.
    ///
    /// If `f` returns `Ok` the copy replaces the document and is saved to
    /// disk. If it returns `Err` the document and the file are left as they
    /// were.
    pub fn modify<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Document) -> Result<R, E>,
        E: From<StorageError>,
    {
        let mut working = self.snapshot();
        let result = f(&mut working)?;

        *self.document.write() = working;
        self.mark_dirty();
        self.save()?;
        Ok(result)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the document to disk, creating parent directories.
    pub fn save(&self) -> StorageResult<()> {
        let text = {
            let document = self.document.read();
            self.format
                .render(&document)
                .map_err(|source| StorageError::Render {
                    path: self.path.clone(),
                    format: self.format.name(),
                    source,
                })?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        fs::write(&self.path, text).map_err(|e| StorageError::io(&self.path, e))?;
        self.dirty.store(false, Ordering::Release);

        trace!(path = %self.path.display(), "Saved storage file");
        Ok(())
    }

    /// Re-reads the file, discarding unsaved changes.
    pub fn reload(&self) -> StorageResult<()> {
        let document = match read_document(&self.path, self.format.as_ref()) {
            Err(StorageError::FileNotFound { .. }) if self.kind == FileKind::Data => Document::new(),
            other => other?,
        };
        *self.document.write() = document;
        self.dirty.store(false, Ordering::Release);
        self.loaded.store(true, Ordering::Release);

        debug!(key = %self.key, "Reloaded storage file");
        Ok(())
    }

    /// Drops the in-memory document. The handle reads as empty afterwards.
    pub fn unload(&self) {
        self.document.write().clear();
        self.dirty.store(false, Ordering::Release);
        self.loaded.store(false, Ordering::Release);
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn deserialize_error(&self, source: serde_json::Error) -> StorageError {
        StorageError::Deserialize {
            path: self.path.clone(),
            source,
        }
    }
}

impl std::fmt::Debug for StorageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFile")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("format", &self.format.name())
            .field("owner", &self.owner)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

fn read_document(path: &Path, format: &dyn StorageFormat) -> StorageResult<Document> {
    let text = fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    if text.trim().is_empty() {
        return Ok(Document::new());
    }
    format.parse(&text).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        format: format.name(),
        source,
    })
}
