//! Configuration module for the Ultros runtime.
//!
//! The root `ultros.toml` names the networks to start and configures
//! logging. Everything else, network settings included, is loaded on demand
//! through the storage manager.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, PROFILE_ENV};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, NetworkEntry, SpanEventConfig, UltrosConfig,
};
pub use validation::validate_config;
