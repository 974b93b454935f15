//! Framework layer: the event manager and handler registrations.

mod handler;
mod manager;
mod priority;

pub use handler::{
    AsyncHandlerFn, Callback, FilterFn, HandlerArgs, HandlerOptions, HandlerResult, SyncHandlerFn,
};
pub use manager::EventManager;
pub use priority::Priority;
