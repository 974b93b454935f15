//! # Ultros
//!
//! A pluggable bot framework that connects to chat networks, dispatches
//! their events to plugin handlers and keeps per-plugin config and data
//! files.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────── Ultros ──────────────────────────────┐
//! │                                                                   │
//! │  NetworkManager ──▶ Network ──▶ Connector ──▶ Protocol ──▶ Server │
//! │                                                          │        │
//! │                                                          ▼        │
//! │  PluginManager ──▶ Plugin ──handlers──▶ EventManager ◀── events   │
//! │        │                                                          │
//! │        └──────────▶ StorageManager (config/, data/)               │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: builds the managers and drives setup and shutdown
//! - **Networks**: one per config entry, created by a registered network type
//! - **Events**: priority-ordered, cancellable handlers keyed by event identifier
//! - **Storage**: cached config and data files in JSON, TOML, YAML or INI
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ultros::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Plugin for Echo {
//!     fn name(&self) -> &str { "echo" }
//!
//!     async fn setup(&self, ctx: &PluginContext) -> Result<(), BoxError> {
//!         ctx.add_handler(
//!             Identifier::of::<IrcMessageEvent>(),
//!             Callback::sync(|event, _args| {
//!                 if let Some(message) = event.downcast_ref::<IrcMessageEvent>() {
//!                     info!(target = %message.target, "{}", message.text);
//!                 }
//!                 Ok(())
//!             }),
//!             HandlerOptions::new(),
//!         );
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let ultros = Ultros::builder().build()?;
//!     ultros.register_network_type::<IrcNetwork>();
//!     ultros.add_plugin(Echo);
//!     ultros.run()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `irc`: the IRC network type (default)
//! - `toml-config` / `yaml-config`: format of `ultros.toml` / `ultros.yaml`
//! - `json-log`: JSON log output
//! - `tls`, `ws-client`, `full-transport`: extra transport dialers

pub use ultros_core as core;
#[cfg(feature = "irc")]
pub use ultros_network_irc as irc;
pub use ultros_runtime as runtime;
pub use ultros_storage as storage;
pub use ultros_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use ultros::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use ultros_runtime::{ShutdownHandle, Ultros, UltrosConfig};

    // Plugins
    pub use ultros_runtime::{Plugin, PluginContext};
    pub use ultros_runtime::{UltrosShutdownEvent, UltrosStartedEvent};

    // Event system
    pub use ultros_core::{
        BaseEvent, BoxError, Callback, Event, HandlerArgs, HandlerOptions, HandlerResult,
        Identifier, OwnerId, PluginEvent, Priority, ProtocolEvent,
    };

    // Networks
    pub use ultros_core::{
        ConfigurableNetwork, Connector, Endpoint, Network, NetworkContext, NetworkDriver,
        NetworkResult, Protocol, Server,
    };

    // Storage
    pub use ultros_storage::{DefaultsPath, StorageFile};

    #[cfg(feature = "irc")]
    pub use ultros_network_irc::{
        IrcLine, IrcMessageEvent, IrcNetwork, IrcReadyEvent, IrcServer, MessageKind,
    };

    pub use async_trait::async_trait;
    pub use ultros_runtime::prelude::*;
}
