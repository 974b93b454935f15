//! Global event type registry.
//!
//! `#[derive(Event)]` calls [`register`] the first time a type's descriptor is
//! requested. Registration computes the identifier list with C3
//! linearisation over the parents' own linearisations and fails fast when two
//! distinct types claim the same identifier.
//!
//! For a diamond `D(B, C)`, `B(A)`, `C(A)`:
//!
//! ```text
//! linearisation  [D, B, C, A]
//! identifiers    [A, C, B, D]   (delivery order)
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::Mutex;
use tracing::trace;

use super::EventDescriptor;

static REGISTRY: LazyLock<Mutex<HashMap<&'static str, &'static EventDescriptor>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Registers an event type and returns its descriptor.
///
/// Registering the same type twice returns the existing descriptor.
///
/// # Panics
///
/// - `identifier` is already registered for a different type.
/// - The parents have no consistent C3 linearisation (e.g. the same parent
///   listed twice, or conflicting ancestor orders).
pub fn register(
    type_id: TypeId,
    type_name: &'static str,
    identifier: &'static str,
    parents: &[&'static EventDescriptor],
) -> &'static EventDescriptor {
    let mut registry = REGISTRY.lock();

    if let Some(existing) = registry.get(identifier) {
        if existing.type_id == type_id {
            return existing;
        }
        panic!(
            "event identifier collision: '{identifier}' is registered by both `{}` and `{type_name}`",
            existing.type_name
        );
    }

    let linearization = match linearize(identifier, parents) {
        Ok(linearization) => linearization,
        Err(conflict) => panic!(
            "cannot linearise event type `{type_name}` ('{identifier}'): inconsistent ancestor order around {conflict:?}"
        ),
    };
    let identifiers = linearization.iter().rev().copied().collect();

    let descriptor: &'static EventDescriptor = Box::leak(Box::new(EventDescriptor {
        identifier,
        type_name,
        type_id,
        linearization,
        identifiers,
    }));
    registry.insert(identifier, descriptor);

    trace!(identifier, type_name, "Registered event type");
    descriptor
}

/// Looks up the descriptor registered under `identifier`.
///
/// Types register lazily, so a type that has never been used is not listed.
pub fn lookup(identifier: &str) -> Option<&'static EventDescriptor> {
    REGISTRY.lock().get(identifier).copied()
}

/// Identifiers of every type registered so far.
pub fn registered() -> Vec<&'static str> {
    let mut identifiers: Vec<_> = REGISTRY.lock().keys().copied().collect();
    identifiers.sort_unstable();
    identifiers
}

/// C3 merge of the parents' linearisations. On failure returns the heads
/// that could not be ordered.
fn linearize(
    identifier: &'static str,
    parents: &[&'static EventDescriptor],
) -> Result<Vec<&'static str>, Vec<&'static str>> {
    let mut sequences: Vec<Vec<&'static str>> = parents
        .iter()
        .map(|parent| parent.linearization.clone())
        .collect();
    sequences.push(parents.iter().map(|parent| parent.identifier).collect());

    let mut result = vec![identifier];

    loop {
        sequences.retain(|sequence| !sequence.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }

        let head = sequences
            .iter()
            .map(|sequence| sequence[0])
            .find(|candidate| {
                !sequences
                    .iter()
                    .any(|sequence| sequence[1..].contains(candidate))
            });

        let Some(head) = head else {
            return Err(sequences.iter().map(|sequence| sequence[0]).collect());
        };

        result.push(head);
        for sequence in &mut sequences {
            if sequence[0] == head {
                sequence.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BaseEvent, EventType};
    use crate::Event;

    #[derive(Debug, Clone, Default, Event)]
    #[event(identifier = "registry.test.a")]
    struct A {
        #[event(parent)]
        base: BaseEvent,
    }

    #[derive(Debug, Clone, Default, Event)]
    #[event(identifier = "registry.test.b")]
    struct B {
        #[event(parent)]
        a: A,
    }

    #[derive(Debug, Clone, Default, Event)]
    #[event(identifier = "registry.test.c")]
    struct C {
        #[event(parent)]
        a: A,
    }

    #[derive(Debug, Clone, Default, Event)]
    #[event(identifier = "registry.test.d")]
    struct D {
        #[event(parent)]
        b: B,
        #[event(parent)]
        c: C,
    }

    #[derive(Debug, Clone, Default, Event)]
    struct Unnamed {
        #[event(parent)]
        base: BaseEvent,
    }

    #[test]
    fn test_single_chain_order() {
        let descriptor = B::static_descriptor();
        assert_eq!(
            descriptor.identifiers(),
            &["event", "registry.test.a", "registry.test.b"]
        );
        assert_eq!(descriptor.identifier(), "registry.test.b");
    }

    #[test]
    fn test_diamond_keeps_most_specific_position() {
        let descriptor = D::static_descriptor();
        assert_eq!(
            descriptor.linearization(),
            &[
                "registry.test.d",
                "registry.test.b",
                "registry.test.c",
                "registry.test.a",
                "event"
            ]
        );
        assert_eq!(
            descriptor.identifiers(),
            &[
                "event",
                "registry.test.a",
                "registry.test.c",
                "registry.test.b",
                "registry.test.d"
            ]
        );
    }

    #[test]
    fn test_default_identifier_uses_module_path() {
        let descriptor = Unnamed::static_descriptor();
        assert_eq!(
            descriptor.identifier(),
            concat!(module_path!(), "::", "Unnamed")
        );
        assert!(lookup(descriptor.identifier()).is_some());
    }

    #[test]
    fn test_registration_is_idempotent() {
        let first = register(
            TypeId::of::<A>(),
            std::any::type_name::<A>(),
            "registry.test.a",
            &[BaseEvent::static_descriptor()],
        );
        assert!(std::ptr::eq(first, A::static_descriptor()));
    }

    #[test]
    #[should_panic(expected = "event identifier collision")]
    fn test_collision_fails_fast() {
        struct Impostor;
        let _ = A::static_descriptor();
        register(
            TypeId::of::<Impostor>(),
            "Impostor",
            "registry.test.a",
            &[],
        );
    }

    #[test]
    fn test_duplicate_parent_cannot_be_linearised() {
        let a = A::static_descriptor();
        assert!(linearize("registry.test.dup", &[a, a]).is_err());
    }

    #[test]
    fn test_upcast_through_diamond() {
        let mut event = D::default();
        let dynamic: &mut dyn Event = &mut event;
        assert!(dynamic.is::<A>());
        assert!(dynamic.is::<C>());
        assert!(dynamic.downcast_ref::<BaseEvent>().is_some());

        dynamic.cancel();
        assert!(event.is_cancelled());
        assert!(event.b.is_cancelled());
        assert!(event.c.is_cancelled());
    }
}
