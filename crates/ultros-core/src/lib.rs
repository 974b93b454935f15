//! # Ultros Core
//!
//! The core engine of the Ultros bot framework.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Event Definition Model**: statically registered event types with
//!   ancestor-ordered identifiers ([`Event`], [`EventType`], [`EventDescriptor`])
//! - **Ownership tokens**: [`OwnerId`] for bulk cleanup by owner
//!
//! ### Framework Layer
//!
//! - **Event Manager**: priority-ordered, cancellable publish/subscribe bus
//!   ([`EventManager`], [`Callback`], [`HandlerOptions`], [`Priority`])
//!
//! ### Integration Layer
//!
//! - **Networks**: registries of servers and connectors ([`Network`])
//! - **Connectors**: transport connections and their lifecycle ([`Connector`])
//! - **Servers**: protocol sessions notified of connector changes ([`Server`])
//! - **Transports**: dial functions keyed by [`TransportKind`] ([`TransportContext`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐  bytes   ┌──────────┐  frames  ┌────────┐  events  ┌──────────────┐
//! │ Transport │─────────▶│ Protocol │─────────▶│ Server │─────────▶│ EventManager │
//! └───────────┘          └──────────┘          └────────┘          └──────────────┘
//!       ▲                      │                                          │
//!       └──── Connector ───────┘                                  handlers by priority
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ultros_core::{BaseEvent, Callback, Event, EventManager, HandlerOptions, Identifier, OwnerId};
//!
//! #[derive(Debug, Clone, Event)]
//! pub struct Greeting {
//!     #[event(parent)]
//!     pub base: BaseEvent,
//!     pub who: String,
//! }
//!
//! let manager = EventManager::new();
//! let owner = OwnerId::new();
//!
//! manager.add_handler(
//!     owner,
//!     Identifier::of::<Greeting>(),
//!     Callback::sync(|event, _args| {
//!         if let Some(greeting) = event.downcast_ref::<Greeting>() {
//!             println!("hello, {}", greeting.who);
//!         }
//!         Ok(())
//!     }),
//!     HandlerOptions::new(),
//! );
//!
//! let greeting = manager
//!     .fire_event(Greeting { base: BaseEvent::default(), who: "world".into() })
//!     .await?;
//! ```

// Generated event impls refer to `::ultros_core`, including the ones in this crate.
extern crate self as ultros_core;

pub mod error;

// Architectural layers
pub mod foundation;
pub mod framework;
pub mod integration;

pub use foundation::event;

// Re-export error types
pub use error::{
    BoxError, EventError, EventResult, NetworkError, NetworkResult, TransportError,
    TransportResult,
};

// Re-export foundation types
pub use foundation::{
    BaseEvent, Event, EventDescriptor, EventType, Identifier, OwnerId, PluginEvent,
    ProtocolEvent,
};
pub use ultros_macros::Event;

// Re-export framework types
pub use framework::{
    Callback, EventManager, HandlerArgs, HandlerOptions, HandlerResult, Priority,
};

// Re-export integration types
pub use integration::{
    AsyncStream, BackRef, BoxedStream, ConfigurableNetwork, Connector, ConnectorState,
    DEFAULT_MAX_LINE, DialFn, Endpoint, LineBuffer, Network, NetworkContext, NetworkDriver,
    Protocol, Server, TransportContext, TransportHandle, TransportKind, downcast_server,
};

pub use futures::future::BoxFuture;

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::framework::{Callback, EventManager, HandlerArgs, HandlerOptions, Priority};
    pub use super::integration::{Connector, Network, Server};
    pub use super::{BoxFuture, Event};
}
