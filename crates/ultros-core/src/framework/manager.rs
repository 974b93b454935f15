//! The event manager: a priority-ordered publish/subscribe bus.
//!
//! # Delivery
//!
//! ```text
//! fire_event(SubEvent)
//!   identifiers: ["event", "base", "sub"]
//!        │
//!        ├─ "event" ─▶ [h(-100), h(0)]
//!        ├─ "base"  ─▶ [h(-50), h(0), h(0)]     (ties: registration order)
//!        └─ "sub"   ─▶ [h(100)]
//! ```
//!
//! Handlers of one firing run strictly one after another, each awaited to
//! completion. A handler that is registered with `accepts_cancelled = false`
//! is skipped once the event is cancelled; a filter returning false skips its
//! registration only.
//!
//! # Failure policy
//!
//! The first handler error aborts the firing and is returned from
//! [`fire_event`](EventManager::fire_event) as [`EventError::Handler`]. The
//! manager does not log or swallow it. Call sites that want to tolerate
//! failing handlers must handle the error themselves.
//!
//! # Concurrency
//!
//! The registry sits behind a lock that is only held to copy out one
//! identifier's handler list. Handlers may therefore add or remove handlers
//! while running; changes apply from the next identifier list or the next
//! firing.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Instrument, debug, debug_span, trace};

use super::handler::{Callback, HandlerOptions, Registration};
use super::priority::Priority;
use crate::error::{EventError, EventResult};
use crate::foundation::{Event, Identifier, OwnerId};

/// Central event bus.
#[derive(Default)]
pub struct EventManager {
    /// Identifier to handlers, each list sorted by ascending priority.
    handlers: RwLock<HashMap<String, Vec<Arc<Registration>>>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers `callback` for events delivered under `identifier`.
    ///
    /// Pass `Identifier::of::<E>()` to subscribe to an event type; the
    /// handler then also runs for every descendant of `E`. The same callback
    /// may be registered any number of times and runs once per registration.
    pub fn add_handler(
        &self,
        owner: OwnerId,
        identifier: impl Into<Identifier>,
        callback: Callback,
        options: HandlerOptions,
    ) {
        let identifier = identifier.into();
        let registration = Arc::new(Registration::new(owner, callback, options));
        let priority = registration.priority;

        let mut handlers = self.handlers.write();
        let list = handlers.entry(identifier.as_str().to_owned()).or_default();
        // After every entry with priority <= ours: keeps the list sorted and ties stable.
        let index = list.partition_point(|existing| existing.priority <= priority);
        list.insert(index, registration);

        debug!(
            identifier = %identifier,
            %owner,
            %priority,
            asynchronous = list[index].callback.is_async(),
            "Handler registered"
        );
    }

    /// Removes registrations of `callback`.
    ///
    /// With `identifier`, only that identifier's list is searched; without
    /// it, every identifier is. `priority` further restricts the match.
    /// Returns the number of registrations removed.
    pub fn remove_handler(
        &self,
        callback: &Callback,
        identifier: Option<Identifier>,
        priority: Option<Priority>,
    ) -> usize {
        let matches = |registration: &Arc<Registration>| {
            registration.callback.same_as(callback)
                && priority.is_none_or(|p| registration.priority == p)
        };

        let mut handlers = self.handlers.write();
        let removed = match identifier {
            Some(identifier) => match handlers.get_mut(identifier.as_str()) {
                Some(list) => remove_matching(list, &matches),
                None => 0,
            },
            None => handlers
                .values_mut()
                .map(|list| remove_matching(list, &matches))
                .sum(),
        };
        handlers.retain(|_, list| !list.is_empty());

        debug!(removed, "Handler removed");
        removed
    }

    /// Removes every registration made by `owner`, across all identifiers.
    /// Returns the number of registrations removed.
    pub fn remove_handlers_for_owner(&self, owner: OwnerId) -> usize {
        let mut handlers = self.handlers.write();
        let removed = handlers
            .values_mut()
            .map(|list| remove_matching(list, |registration| registration.owner == owner))
            .sum();
        handlers.retain(|_, list| !list.is_empty());

        debug!(%owner, removed, "Handlers removed for owner");
        removed
    }

    /// Number of registrations for `identifier`.
    pub fn handler_count(&self, identifier: impl Into<Identifier>) -> usize {
        let identifier = identifier.into();
        self.handlers
            .read()
            .get(identifier.as_str())
            .map_or(0, Vec::len)
    }

    /// Identifiers that currently have at least one registration.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<_> = self.handlers.read().keys().cloned().collect();
        identifiers.sort_unstable();
        identifiers
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Drops every registration.
    pub fn shutdown(&self) {
        let mut handlers = self.handlers.write();
        let count: usize = handlers.values().map(Vec::len).sum();
        handlers.clear();
        debug!(count, "Event manager shut down");
    }

    // =========================================================================
    // Firing
    // =========================================================================

    /// Fires `event` and returns it after every handler ran.
    ///
    /// # Errors
    ///
    /// Returns the first handler failure; later handlers do not run.
    pub async fn fire_event<E: Event>(&self, mut event: E) -> EventResult<E> {
        self.fire_dyn(&mut event).await?;
        Ok(event)
    }

    /// Fires a type-erased event in place.
    pub async fn fire_dyn(&self, event: &mut dyn Event) -> EventResult<()> {
        let descriptor = event.descriptor();
        let span = debug_span!("fire_event", identifier = descriptor.identifier());

        async move {
            for identifier in descriptor.identifiers() {
                for registration in self.snapshot(identifier) {
                    if !registration.should_run(&*event) {
                        trace!(identifier, priority = %registration.priority, "Handler skipped");
                        continue;
                    }

                    registration
                        .callback
                        .invoke(&mut *event, &registration.args)
                        .await
                        .map_err(|source| EventError::Handler {
                            identifier: (*identifier).to_owned(),
                            source,
                        })?;
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    fn snapshot(&self, identifier: &str) -> Vec<Arc<Registration>> {
        self.handlers
            .read()
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }
}

/// Removes matching entries, preserving the order of the rest.
fn remove_matching<F>(list: &mut Vec<Arc<Registration>>, matches: F) -> usize
where
    F: Fn(&Arc<Registration>) -> bool,
{
    let before = list.len();
    list.retain(|registration| !matches(registration));
    before - list.len()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::Event;
    use crate::event::{BaseEvent, EventType};

    #[derive(Debug, Clone, Default, Event)]
    #[event(identifier = "manager.test.base")]
    struct TestBaseEvent {
        #[event(parent)]
        base: BaseEvent,
        value: u32,
    }

    #[derive(Debug, Clone, Default, Event)]
    #[event(identifier = "manager.test.sub")]
    struct TestSubEvent {
        #[event(parent)]
        parent: TestBaseEvent,
    }

    fn recorder(log: &Arc<Mutex<Vec<i32>>>, tag: i32) -> Callback {
        let log = Arc::clone(log);
        Callback::sync(move |_, _| {
            log.lock().push(tag);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_empty_registry_returns_event_unchanged() {
        let manager = EventManager::new();
        let event = manager
            .fire_event(TestBaseEvent {
                value: 7,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(event.value, 7);
        assert!(!event.is_cancelled());
    }

    #[tokio::test]
    async fn test_priority_order() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for priority in [50, -50, 0, 100, -100] {
            manager.add_handler(
                owner,
                Identifier::of::<TestBaseEvent>(),
                recorder(&log, priority),
                HandlerOptions::new().priority(priority),
            );
        }

        manager.fire_event(TestBaseEvent::default()).await.unwrap();
        assert_eq!(*log.lock(), vec![-100, -50, 0, 50, 100]);
    }

    #[tokio::test]
    async fn test_equal_priority_keeps_registration_order() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=4 {
            manager.add_handler(owner, "manager.test.base", recorder(&log, tag), HandlerOptions::new());
        }
        manager.add_handler(
            owner,
            "manager.test.base",
            recorder(&log, 0),
            HandlerOptions::new().priority(Priority::LOW),
        );

        manager.fire_event(TestBaseEvent::default()).await.unwrap();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_cancelled_event_only_reaches_accepting_handlers() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.add_handler(owner, "manager.test.base", recorder(&log, 1), HandlerOptions::new());
        manager.add_handler(
            owner,
            "manager.test.base",
            recorder(&log, 2),
            HandlerOptions::new().accepts_cancelled(true),
        );

        let mut event = TestBaseEvent::default();
        event.set_cancelled(true);
        let event = manager.fire_event(event).await.unwrap();

        assert_eq!(*log.lock(), vec![2]);
        assert!(event.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelling_mid_firing_skips_later_handlers() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.add_handler(
            owner,
            "manager.test.base",
            Callback::sync(|event, _| {
                event.cancel();
                Ok(())
            }),
            HandlerOptions::new().priority(Priority::LOWEST),
        );
        manager.add_handler(owner, "manager.test.base", recorder(&log, 1), HandlerOptions::new());

        let event = manager.fire_event(TestBaseEvent::default()).await.unwrap();
        assert!(event.is_cancelled());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_filter_blocks_only_its_registration() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let callback = recorder(&log, 1);

        manager.add_handler(
            owner,
            "manager.test.base",
            callback.clone(),
            HandlerOptions::new().filter(|_| false),
        );
        manager.add_handler(
            owner,
            "manager.test.base",
            callback,
            HandlerOptions::new().filter(|event| {
                event
                    .downcast_ref::<TestBaseEvent>()
                    .is_some_and(|e| e.value == 3)
            }),
        );

        manager
            .fire_event(TestBaseEvent {
                value: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_remove_handlers_for_owner() {
        let manager = EventManager::new();
        let plugin = OwnerId::new();
        let other = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.add_handler(plugin, "manager.test.base", recorder(&log, 1), HandlerOptions::new());
        manager.add_handler(plugin, "manager.test.sub", recorder(&log, 2), HandlerOptions::new());
        manager.add_handler(other, "manager.test.base", recorder(&log, 3), HandlerOptions::new());

        assert_eq!(manager.remove_handlers_for_owner(plugin), 2);
        manager.fire_event(TestSubEvent::default()).await.unwrap();

        assert_eq!(*log.lock(), vec![3]);
        assert_eq!(manager.identifiers(), vec!["manager.test.base".to_owned()]);
    }

    #[tokio::test]
    async fn test_base_handlers_run_before_sub_handlers() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        // Registered specific-first to show that order comes from the identifiers.
        manager.add_handler(
            owner,
            Identifier::of::<TestSubEvent>(),
            recorder(&log, 2),
            HandlerOptions::new().priority(Priority::LOWEST),
        );
        manager.add_handler(
            owner,
            Identifier::of::<TestBaseEvent>(),
            recorder(&log, 1),
            HandlerOptions::new().priority(Priority::HIGHEST),
        );

        manager.fire_event(TestSubEvent::default()).await.unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(
            TestSubEvent::static_descriptor().identifiers(),
            &["event", "manager.test.base", "manager.test.sub"]
        );
    }

    #[tokio::test]
    async fn test_remove_handler_without_identifier_scans_all() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = recorder(&log, 1);
        let other = recorder(&log, 2);

        manager.add_handler(owner, "manager.test.base", shared.clone(), HandlerOptions::new());
        manager.add_handler(
            owner,
            "manager.test.base",
            shared.clone(),
            HandlerOptions::new().priority(Priority::HIGH),
        );
        manager.add_handler(owner, "manager.test.sub", shared.clone(), HandlerOptions::new());
        manager.add_handler(owner, "manager.test.sub", other, HandlerOptions::new());

        assert_eq!(manager.remove_handler(&shared, None, None), 3);
        manager.fire_event(TestSubEvent::default()).await.unwrap();
        assert_eq!(*log.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_remove_handler_with_identifier_and_priority() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = recorder(&log, 1);

        manager.add_handler(owner, "manager.test.base", shared.clone(), HandlerOptions::new());
        manager.add_handler(
            owner,
            "manager.test.base",
            shared.clone(),
            HandlerOptions::new().priority(Priority::HIGH),
        );
        manager.add_handler(owner, "manager.test.sub", shared.clone(), HandlerOptions::new());

        let removed = manager.remove_handler(
            &shared,
            Some("manager.test.base".into()),
            Some(Priority::HIGH),
        );
        assert_eq!(removed, 1);
        assert_eq!(manager.handler_count("manager.test.base"), 1);
        assert_eq!(manager.handler_count("manager.test.sub"), 1);

        // A look-alike callback is a different callable.
        let lookalike = recorder(&log, 1);
        assert_eq!(manager.remove_handler(&lookalike, None, None), 0);
    }

    #[tokio::test]
    async fn test_async_handlers_are_awaited_in_sequence() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = Arc::clone(&log);
        manager.add_handler(
            owner,
            "manager.test.base",
            Callback::asynchronous(move |_, _| {
                let log = Arc::clone(&slow_log);
                Box::pin(async move {
                    log.lock().push(1);
                    tokio::task::yield_now().await;
                    tokio::task::yield_now().await;
                    log.lock().push(2);
                    Ok(())
                })
            }),
            HandlerOptions::new(),
        );
        manager.add_handler(owner, "manager.test.base", recorder(&log, 3), HandlerOptions::new());

        manager.fire_event(TestBaseEvent::default()).await.unwrap();
        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_handler_error_aborts_firing() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let calls = Arc::new(AtomicUsize::new(0));

        manager.add_handler(
            owner,
            "manager.test.base",
            Callback::sync(|_, _| Err("boom".into())),
            HandlerOptions::new(),
        );
        let counter = Arc::clone(&calls);
        manager.add_handler(
            owner,
            "manager.test.base",
            Callback::sync(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            HandlerOptions::new().priority(Priority::HIGH),
        );

        let err = manager
            .fire_event(TestBaseEvent::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Handler { ref identifier, .. } if identifier == "manager.test.base"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_receives_extra_args() {
        let manager = EventManager::new();
        let owner = OwnerId::new();
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        manager.add_handler(
            owner,
            "manager.test.base",
            Callback::sync(move |_, args| {
                *sink.lock() = Some(args.clone());
                Ok(())
            }),
            HandlerOptions::new().arg(1).arg("two").kwarg("three", 3.0),
        );

        manager.fire_event(TestBaseEvent::default()).await.unwrap();
        let args = seen.lock().clone().unwrap();
        assert_eq!(args.arg(0), Some(&serde_json::json!(1)));
        assert_eq!(args.arg(1), Some(&serde_json::json!("two")));
        assert_eq!(args.kwarg("three"), Some(&serde_json::json!(3.0)));
    }

    #[tokio::test]
    async fn test_handler_can_mutate_event() {
        let manager = EventManager::new();
        manager.add_handler(
            OwnerId::new(),
            Identifier::of::<TestBaseEvent>(),
            Callback::sync(|event, _| {
                if let Some(base) = event.downcast_mut::<TestBaseEvent>() {
                    base.value += 1;
                }
                Ok(())
            }),
            HandlerOptions::new(),
        );

        let event = manager.fire_event(TestSubEvent::default()).await.unwrap();
        assert_eq!(event.value, 1);
    }

    #[tokio::test]
    async fn test_handler_may_register_during_firing() {
        let manager = Arc::new(EventManager::new());
        let owner = OwnerId::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_manager = Arc::clone(&manager);
        let inner_calls = Arc::clone(&calls);
        manager.add_handler(
            owner,
            "manager.test.base",
            Callback::sync(move |_, _| {
                let counter = Arc::clone(&inner_calls);
                inner_manager.add_handler(
                    owner,
                    "manager.test.base",
                    Callback::sync(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    HandlerOptions::new(),
                );
                Ok(())
            }),
            HandlerOptions::new(),
        );

        manager.fire_event(TestBaseEvent::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.handler_count("manager.test.base"), 2);

        manager.shutdown();
        assert!(manager.is_empty());
    }
}
