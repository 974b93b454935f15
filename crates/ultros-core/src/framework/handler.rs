//! Handler callables and registration options.
//!
//! Synchronous and asynchronous handlers share one registry. The choice is
//! made once, when the [`Callback`] is built, and never inspected again until
//! invocation.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use super::priority::Priority;
use crate::error::BoxError;
use crate::foundation::{Event, OwnerId};

/// What a handler returns.
pub type HandlerResult = Result<(), BoxError>;

/// Synchronous handler signature.
pub type SyncHandlerFn = dyn Fn(&mut dyn Event, &HandlerArgs) -> HandlerResult + Send + Sync;

/// Asynchronous handler signature.
pub type AsyncHandlerFn = dyn for<'a> Fn(&'a mut dyn Event, &'a HandlerArgs) -> BoxFuture<'a, HandlerResult>
    + Send
    + Sync;

/// Registration filter; returning false skips that registration.
pub type FilterFn = dyn Fn(&dyn Event) -> bool + Send + Sync;

// =============================================================================
// Callback
// =============================================================================

/// A handler callable.
///
/// Clones share identity, which is what [`EventManager::remove_handler`]
/// matches on: keep a clone of the callback to remove it later.
///
/// [`EventManager::remove_handler`]: super::EventManager::remove_handler
#[derive(Clone)]
pub enum Callback {
    /// Runs to completion without yielding.
    Sync(Arc<SyncHandlerFn>),
    /// Awaited before the next handler starts.
    Async(Arc<AsyncHandlerFn>),
}

impl Callback {
    /// Wraps a synchronous handler.
    ///
    /// ```rust,ignore
    /// let cb = Callback::sync(|event, _args| {
    ///     event.cancel();
    ///     Ok(())
    /// });
    /// ```
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Event, &HandlerArgs) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps an asynchronous handler.
    ///
    /// ```rust,ignore
    /// let cb = Callback::asynchronous(|event, _args| {
    ///     Box::pin(async move {
    ///         tokio::task::yield_now().await;
    ///         event.cancel();
    ///         Ok(())
    ///     })
    /// });
    /// ```
    pub fn asynchronous<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut dyn Event, &'a HandlerArgs) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Identity comparison: true only for clones of the same callback.
    pub fn same_as(&self, other: &Callback) -> bool {
        match (self, other) {
            (Self::Sync(a), Self::Sync(b)) => Arc::ptr_eq(a, b),
            (Self::Async(a), Self::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) async fn invoke(&self, event: &mut dyn Event, args: &HandlerArgs) -> HandlerResult {
        match self {
            Self::Sync(f) => f(event, args),
            Self::Async(f) => f(event, args).await,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(inner) => write!(f, "Callback::Sync({:p})", Arc::as_ptr(inner)),
            Self::Async(inner) => write!(f, "Callback::Async({:p})", Arc::as_ptr(inner)),
        }
    }
}

// =============================================================================
// Handler Arguments
// =============================================================================

/// Extra positional and keyword arguments stored with a registration and
/// passed to the handler on every invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl HandlerArgs {
    /// Positional argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword argument named `key`.
    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

// =============================================================================
// Registration Options
// =============================================================================

/// Options for [`EventManager::add_handler`](super::EventManager::add_handler).
///
/// ```rust,ignore
/// HandlerOptions::new()
///     .priority(Priority::HIGH)
///     .accepts_cancelled(true)
///     .filter(|event| !event.identifier().is_empty())
///     .kwarg("channel", "#ultros")
/// ```
#[derive(Clone, Default)]
pub struct HandlerOptions {
    pub(crate) priority: Priority,
    pub(crate) filter: Option<Arc<FilterFn>>,
    pub(crate) accepts_cancelled: bool,
    pub(crate) args: HandlerArgs,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Run even when an earlier handler cancelled the event.
    pub fn accepts_cancelled(mut self, accepts: bool) -> Self {
        self.accepts_cancelled = accepts;
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.kwargs.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("priority", &self.priority)
            .field("filter", &self.filter.is_some())
            .field("accepts_cancelled", &self.accepts_cancelled)
            .field("args", &self.args)
            .finish()
    }
}

/// One entry in the manager's registry.
pub(crate) struct Registration {
    pub(crate) owner: OwnerId,
    pub(crate) callback: Callback,
    pub(crate) priority: Priority,
    pub(crate) filter: Option<Arc<FilterFn>>,
    pub(crate) accepts_cancelled: bool,
    pub(crate) args: HandlerArgs,
}

impl Registration {
    pub(crate) fn new(owner: OwnerId, callback: Callback, options: HandlerOptions) -> Self {
        Self {
            owner,
            callback,
            priority: options.priority,
            filter: options.filter,
            accepts_cancelled: options.accepts_cancelled,
            args: options.args,
        }
    }

    /// Whether this registration runs for `event` in its current state.
    pub(crate) fn should_run(&self, event: &dyn Event) -> bool {
        if event.is_cancelled() && !self.accepts_cancelled {
            return false;
        }
        match &self.filter {
            Some(filter) => filter(event),
            None => true,
        }
    }
}
