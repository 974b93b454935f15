//! Ultros Runtime - orchestration layer for the Ultros bot framework.
//!
//! This crate provides:
//! - The [`Ultros`] root object and its builder
//! - Network management from configuration ([`NetworkManager`])
//! - Plugins ([`Plugin`], [`PluginManager`])
//! - Configuration loading ([`config`]) and logging setup ([`logging`])
//! - Signal handling and programmatic shutdown ([`ShutdownHandle`])
//!
//! # Transports
//!
//! Dialers are registered according to enabled cargo features:
//!
//! - always: TCP and subprocess
//! - `tls`: TLS over TCP
//! - `ws-client`: WebSocket client
//!
//! # Example
//!
//! ```rust,ignore
//! use ultros_runtime::Ultros;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ultros = Ultros::builder().config_dir("./config").build()?;
//!     ultros.register_network_type::<ultros_network_irc::IrcNetwork>();
//!     ultros.add_plugin(MyPlugin::default());
//!     ultros.run()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod network;
pub mod plugin;
pub mod runtime;
pub mod transport;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, NetworkEntry, UltrosConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use events::{UltrosShutdownEvent, UltrosStartedEvent};
pub use network::NetworkManager;
pub use plugin::{Plugin, PluginContext, PluginManager};
pub use runtime::{DEFAULT_CONFIG_DIR, DEFAULT_DATA_DIR, ShutdownHandle, Ultros, UltrosBuilder};
pub use transport::create_default_transport_context;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
