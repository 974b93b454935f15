//! Integration layer: networks, connectors, servers and transports.
//!
//! ```text
//!                    ┌──────────────── Network ────────────────┐
//!                    │  servers     { name → Arc<dyn Server> } │
//!                    │  connectors  { name → Arc<Connector> }  │
//!                    │  associations{ server → [connector] }   │
//!                    └─────────────────────────────────────────┘
//!                         ▲ BackRef                ▲ BackRef
//!                         │                        │
//!   transport ◀──── Connector ── notify ──▶ Network ── connector_connected ──▶ Server
//!                     │ Protocol                             connector_disconnected
//! ```
//!
//! The network is the only owner. Connectors and servers reach back through
//! [`BackRef`]s, which report [`NetworkError::Gone`](crate::NetworkError::Gone)
//! once the referent has been dropped.

mod backref;
mod connector;
mod driver;
mod network;
mod protocol;
mod server;
mod transport;

pub use backref::BackRef;
pub use connector::{Connector, ConnectorState};
pub use driver::{ConfigurableNetwork, NetworkContext, NetworkDriver};
pub use network::Network;
pub use protocol::{DEFAULT_MAX_LINE, LineBuffer, Protocol};
pub use server::{Server, downcast_server};
pub use transport::{
    AsyncStream, BoxedStream, DialFn, Endpoint, TransportContext, TransportHandle, TransportKind,
};
