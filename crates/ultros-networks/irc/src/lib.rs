//! # Ultros IRC Network
//!
//! The `irc` network type for the Ultros bot framework.
//!
//! ## Overview
//!
//! - [`IrcLine`]: the line grammar, parsed from and displayed to the wire
//! - [`IrcProtocol`]: CRLF framing and in-order line dispatch per connector
//! - [`IrcServer`]: one IRC session (registration, PING, CAP, ISUPPORT, messages)
//! - [`IrcNetwork`]: the network driver built from an [`IrcConfig`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ultros_network_irc::IrcNetwork;
//! use ultros_runtime::Ultros;
//!
//! let ultros = Ultros::builder().build()?;
//! ultros.register_network_type::<IrcNetwork>();
//! ultros.run()?;
//! ```
//!
//! with `config/networks/libera.toml`:
//!
//! ```toml
//! type = "irc"
//! host = "irc.libera.chat"
//! port = 6697
//! tls = true
//! channels = ["#ultros"]
//! ```
//!
//! ## Events
//!
//! ```text
//! IrcEvent ("irc")
//! ├── IrcLineEvent ("irc.line")
//! ├── IrcReadyEvent ("irc.ready")
//! └── IrcMessageEvent ("irc.message")
//! ```
//!
//! Handlers reply through the session:
//!
//! ```rust,ignore
//! let server = network.get_server_as::<IrcServer>(&event.server).ok_or("no such server")?;
//! server.send_privmsg(&event.target, "pong").await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod line;
pub mod network;
pub mod protocol;
pub mod server;

pub use config::IrcConfig;
pub use error::{IrcError, IrcResult};
pub use events::{IrcEvent, IrcLineEvent, IrcMessageEvent, IrcReadyEvent, MessageKind};
pub use line::IrcLine;
pub use network::IrcNetwork;
pub use protocol::{IrcProtocol, MAX_LINE_LENGTH};
pub use server::{IrcServer, IsupportValues, UNHANDLED};

/// Network type name, protocol name and `type` key value.
pub const IRC_KIND: &str = "irc";
