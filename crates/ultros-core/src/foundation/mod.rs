//! Foundation layer: the event type system and ownership tokens.

pub mod event;
mod owner;

pub use event::{
    BaseEvent, Event, EventDescriptor, EventType, Identifier, PluginEvent, ProtocolEvent,
};
pub use owner::OwnerId;
