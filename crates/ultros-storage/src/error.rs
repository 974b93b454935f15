use std::path::PathBuf;

use thiserror::Error;

use crate::format::FileKind;

/// Error produced by a format driver.
pub type FormatError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the storage manager and file handles.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No registered format matches the path's extension.
    #[error("unknown storage format for '{path}'")]
    UnknownFormat { path: String },

    /// The format exists but cannot be used for this kind of file.
    #[error("format '{format}' does not support {kind} files")]
    UnsupportedFormat { format: &'static str, kind: FileKind },

    /// The file does not exist and no default resolved.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file's contents are not valid for its format.
    #[error("failed to parse {} as {format}: {source}", path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        #[source]
        source: FormatError,
    },

    /// The document cannot be written in the file's format.
    #[error("failed to render {} as {format}: {source}", path.display())]
    Render {
        path: PathBuf,
        format: &'static str,
        #[source]
        source: FormatError,
    },

    /// A value does not have the requested shape.
    #[error("unexpected value in {}: {source}", path.display())]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether this is a missing-file error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
