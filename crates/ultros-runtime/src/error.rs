//! Runtime error types.

use thiserror::Error;
use ultros_core::{BoxError, EventError, NetworkError};
use ultros_storage::StorageError;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Event(#[from] EventError),

    /// A network's config file has no `type` key.
    #[error("network '{network}' has no 'type' in its configuration")]
    MissingNetworkType { network: String },

    /// No network type is registered under this name.
    #[error("network '{network}' has unknown type '{kind}'")]
    UnknownNetworkType { network: String, kind: String },

    /// A network with this name is already running.
    #[error("network '{0}' already exists")]
    DuplicateNetwork(String),

    #[error("network '{0}' is not running")]
    NetworkNotFound(String),

    /// A plugin with this name is already loaded.
    #[error("plugin '{0}' is already loaded")]
    DuplicatePlugin(String),

    #[error("plugin '{0}' is not loaded")]
    PluginNotFound(String),

    /// A plugin's setup or shutdown failed.
    #[error("plugin '{plugin}' failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: BoxError,
    },

    /// Building the async runtime failed.
    #[error("failed to start async runtime: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
