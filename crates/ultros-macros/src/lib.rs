//! Procedural macros for the Ultros bot framework.
//!
//! This crate provides `#[derive(Event)]`, the static registration step for
//! event types. It is re-exported by `ultros-core` next to the `Event` trait,
//! so downstream crates never depend on it directly.
//!
//! ```rust,ignore
//! use ultros_core::{BaseEvent, Event};
//!
//! #[derive(Debug, Clone, Event)]
//! #[event(identifier = "greeting")]
//! pub struct GreetingEvent {
//!     #[event(parent)]
//!     pub base: BaseEvent,
//!     pub who: String,
//! }
//! ```

mod event;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `Event` and `EventType` for a struct.
///
/// # Struct attributes
///
/// - `#[event(identifier = "...")]`: explicit identifier. When omitted the
///   identifier is `module_path!()::TypeName`.
///
/// # Field attributes
///
/// - `#[event(parent)]`: the field holds a parent event. Several parents are
///   allowed; their identifiers are merged with C3 linearisation. With exactly
///   one parent, `Deref`/`DerefMut` to it are generated.
/// - `#[event(cancelled)]`: the `bool` cancellation flag of a root event
///   (a struct without parents).
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match event::derive_event(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
