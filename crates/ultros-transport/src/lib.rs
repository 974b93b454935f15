//! # Ultros Transport
//!
//! Dialers for the transport kinds defined in `ultros-core`.
//!
//! Each dialer has the [`DialFn`](ultros_core::DialFn) signature and turns an
//! [`Endpoint`](ultros_core::Endpoint) into a byte stream a connector can
//! drive. The runtime registers the ones its enabled features provide.
//!
//! ## Features
//!
//! - `tls`: TLS over TCP via `native-tls`
//! - `ws-client`: WebSocket client; text frames are exchanged as CRLF lines
//! - `full`: all of the above
//!
//! TCP and subprocess transports are always available.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Network types      │  (IRC, ...)
//! ├─────────────────────┤
//! │  ultros-core        │  (Connector, TransportContext)
//! ├─────────────────────┤
//! │  ultros-transport   │  <- This crate (dialers)
//! ├─────────────────────┤
//! │  TCP / TLS / stdio  │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ultros_core::{TransportContext, TransportKind};
//!
//! let transports = TransportContext::new()
//!     .with(TransportKind::Tcp, ultros_transport::dial_tcp)
//!     .with(TransportKind::Process, ultros_transport::dial_process);
//! ```

mod process;
mod tcp;
#[cfg(feature = "tls")]
mod tls;
#[cfg(feature = "ws-client")]
mod websocket;

pub use process::dial_process;
pub use tcp::dial_tcp;
#[cfg(feature = "tls")]
pub use tls::dial_tls;
#[cfg(feature = "ws-client")]
pub use websocket::dial_websocket;

use ultros_core::{Endpoint, TransportError};

fn wrong_endpoint(expected: &str, endpoint: &Endpoint) -> TransportError {
    TransportError::InvalidEndpoint(format!("{expected} dialer cannot dial {endpoint}"))
}
