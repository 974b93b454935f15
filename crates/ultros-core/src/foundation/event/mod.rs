//! Event definition model.
//!
//! Every event type has a stable identifier and an ordered list of
//! identifiers: its ancestors from most general to most specific, ending with
//! its own. Handlers subscribe to one identifier; firing walks the list, so a
//! handler subscribed to an ancestor also sees every descendant event.
//!
//! Types register themselves through `#[derive(Event)]`, which computes the
//! list once per type (see [`registry`]) and caches it in a static.
//!
//! # Parent-in-child
//!
//! ```text
//! IrcMessageEvent { sender, target, text, .. }
//! └── IrcEvent { line }                       (#[event(parent)])
//!     └── ProtocolEvent { network, protocol } (#[event(parent)])
//!         └── BaseEvent { cancelled }         (#[event(cancelled)])
//! ```
//!
//! A handler registered on `ProtocolEvent` receives the `IrcMessageEvent` as
//! `&mut dyn Event` and can view it as its own type with
//! [`downcast_ref`](trait.Event.html#method.downcast_ref).

mod general;
pub mod registry;

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;

pub use general::{BaseEvent, PluginEvent, ProtocolEvent};

// =============================================================================
// Event Trait
// =============================================================================

/// A record of something that happened.
///
/// Implemented by `#[derive(Event)]`; hand-written impls are possible but
/// must return the descriptor produced by [`registry::register`].
pub trait Event: Any + Send + Sync + 'static {
    /// Static metadata of the concrete type.
    fn descriptor(&self) -> &'static EventDescriptor;

    /// Whether a handler has cancelled this event.
    fn is_cancelled(&self) -> bool;

    /// Sets the cancellation flag.
    fn set_cancelled(&mut self, cancelled: bool);

    /// Returns self as `Any` for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Returns self as mutable `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Returns the part of this event whose type is `type_id`: the event
    /// itself or one of its embedded ancestors.
    fn upcast_ref(&self, type_id: TypeId) -> Option<&dyn Any>;

    /// Mutable counterpart of [`upcast_ref`](Event::upcast_ref).
    fn upcast_mut(&mut self, type_id: TypeId) -> Option<&mut dyn Any>;
}

/// Static access to an event type's descriptor.
pub trait EventType: Event + Sized {
    /// Returns the descriptor, registering the type on first call.
    ///
    /// # Panics
    ///
    /// Panics on first call if the identifier is already taken by another
    /// type, or if the parents cannot be linearised.
    fn static_descriptor() -> &'static EventDescriptor;
}

impl dyn Event {
    /// The concrete type's own identifier.
    pub fn identifier(&self) -> &'static str {
        self.descriptor().identifier()
    }

    /// Identifiers this event is delivered under, general to specific.
    pub fn identifiers(&self) -> &'static [&'static str] {
        self.descriptor().identifiers()
    }

    /// Marks the event as cancelled.
    pub fn cancel(&mut self) {
        self.set_cancelled(true);
    }

    /// Returns true if the event is `T` or embeds `T` as an ancestor.
    pub fn is<T: Event>(&self) -> bool {
        self.upcast_ref(TypeId::of::<T>()).is_some()
    }

    /// Views the event as `T`, which may be the concrete type or any ancestor.
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.upcast_ref(TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Mutable counterpart of [`downcast_ref`](#method.downcast_ref).
    pub fn downcast_mut<T: Event>(&mut self) -> Option<&mut T> {
        self.upcast_mut(TypeId::of::<T>())?.downcast_mut::<T>()
    }
}

impl fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("identifier", &self.identifier())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Per-type event metadata, created once and never freed.
#[derive(Debug)]
pub struct EventDescriptor {
    identifier: &'static str,
    type_name: &'static str,
    type_id: TypeId,
    /// C3 linearisation, most specific first.
    linearization: Vec<&'static str>,
    /// The linearisation reversed: delivery order.
    identifiers: Vec<&'static str>,
}

impl EventDescriptor {
    /// The type's own identifier.
    pub fn identifier(&self) -> &'static str {
        self.identifier
    }

    /// Rust type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `TypeId` of the registered type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Ancestor identifiers followed by the type's own, without duplicates.
    pub fn identifiers(&self) -> &[&'static str] {
        &self.identifiers
    }

    /// Same identifiers, most specific first.
    pub fn linearization(&self) -> &[&'static str] {
        &self.linearization
    }

    /// Returns true if `identifier` is this type's or one of its ancestors'.
    pub fn matches(&self, identifier: &str) -> bool {
        self.identifiers.iter().any(|id| *id == identifier)
    }
}

// =============================================================================
// Identifier
// =============================================================================

/// Subscription key: a literal string or the identifier of an event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Cow<'static, str>);

impl Identifier {
    /// Creates an identifier from a string.
    pub fn new(identifier: impl Into<Cow<'static, str>>) -> Self {
        Self(identifier.into())
    }

    /// The own identifier of `E` (not its ancestors).
    pub fn of<E: EventType>() -> Self {
        Self(Cow::Borrowed(E::static_descriptor().identifier()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Identifier {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&EventDescriptor> for Identifier {
    fn from(value: &EventDescriptor) -> Self {
        Self(Cow::Borrowed(value.identifier))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
