//! Unified error types for the Ultros core.
//!
//! Errors are split by the boundary they cross:
//!
//! - [`EventError`]: a handler failed during `fire_event`. The manager never
//!   swallows these; the firing is aborted and the error returned to the caller.
//! - [`TransportError`]: dialing, reading or writing a transport failed.
//! - [`NetworkError`]: registry and connector lifecycle failures, including
//!   dereferencing a back-reference whose owner is gone.

use thiserror::Error;

use crate::integration::ConnectorState;

/// Error type handlers return. Any `std::error::Error` converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised while firing an event.
#[derive(Debug, Error)]
pub enum EventError {
    /// A handler returned an error; remaining handlers were not run.
    #[error("handler for '{identifier}' failed: {source}")]
    Handler {
        /// Identifier whose handler list was being processed.
        identifier: String,
        /// The handler's error.
        #[source]
        source: BoxError,
    },
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Dialing the remote end failed.
    #[error("connection failed: {address} - {reason}")]
    ConnectionFailed {
        /// The address that failed to connect.
        address: String,
        /// Reason for failure.
        reason: String,
    },

    /// The connection was closed while an operation needed it.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Writing to the transport failed.
    #[error("failed to send data: {0}")]
    SendFailed(String),

    /// No dialer is registered for the requested transport kind.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport kind that's not available.
        transport: &'static str,
    },

    /// The endpoint cannot be dialed as given.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Network Errors
// =============================================================================

/// Errors from network registries and the connector state machine.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A back-reference outlived its referent.
    #[error("{what} is gone")]
    Gone {
        /// What the back-reference pointed to.
        what: &'static str,
    },

    /// The connector is not in a state that allows the operation.
    #[error("connector '{connector}' is {actual}, expected {expected}")]
    InvalidState {
        /// Connector name.
        connector: String,
        /// State(s) the operation requires.
        expected: &'static str,
        /// State the connector was in.
        actual: ConnectorState,
    },

    /// A server with this name already exists on the network.
    #[error("server '{0}' already exists")]
    DuplicateServer(String),

    /// A connector with this name already exists on the network.
    #[error("connector '{0}' already exists")]
    DuplicateConnector(String),

    /// No server with this name exists on the network.
    #[error("server '{0}' not found")]
    ServerNotFound(String),

    /// No connector with this name exists on the network.
    #[error("connector '{0}' not found")]
    ConnectorNotFound(String),

    /// Network configuration was rejected.
    #[error("invalid network configuration: {0}")]
    Config(String),

    /// Protocol-level failure reported by a server or protocol driver.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An event fired by network code failed.
    #[error(transparent)]
    Event(#[from] EventError),
}

impl NetworkError {
    /// Creates a configuration error with the given message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a protocol error with the given message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for event firing.
pub type EventResult<T> = Result<T, EventError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
