//! IRC error types.

use thiserror::Error;
use ultros_core::NetworkError;

/// Errors raised while reading or building IRC lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrcError {
    /// The line has no command token.
    #[error("line has no command: {0:?}")]
    MissingCommand(String),

    /// A line sent by the server was not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// A command arrived with fewer parameters than it needs.
    #[error("{command} needs at least {expected} parameters, got {actual}")]
    MissingParams {
        command: String,
        expected: usize,
        actual: usize,
    },

    /// A line to be sent contains CR, LF or NUL.
    #[error("line contains a forbidden character: {0:?}")]
    ForbiddenCharacter(String),
}

impl From<IrcError> for NetworkError {
    fn from(err: IrcError) -> Self {
        NetworkError::protocol(err.to_string())
    }
}

/// Result type for IRC line operations.
pub type IrcResult<T> = Result<T, IrcError>;
