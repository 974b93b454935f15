use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{NetworkError, NetworkResult};

/// Non-owning reference from a child object to its owner.
///
/// Dereferencing after the owner was dropped yields
/// [`NetworkError::Gone`] naming what was pointed to.
pub struct BackRef<T: ?Sized> {
    inner: Weak<T>,
    what: &'static str,
}

impl<T: ?Sized> BackRef<T> {
    /// Creates a back-reference to `target`. `what` names the referent in errors.
    pub fn new(target: &Arc<T>, what: &'static str) -> Self {
        Self {
            inner: Arc::downgrade(target),
            what,
        }
    }

    /// Upgrades to a strong reference.
    pub fn get(&self) -> NetworkResult<Arc<T>> {
        self.inner
            .upgrade()
            .ok_or(NetworkError::Gone { what: self.what })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Whether this refers to the same allocation as `target`.
    pub fn points_to(&self, target: &Arc<T>) -> bool {
        std::ptr::addr_eq(self.inner.as_ptr(), Arc::as_ptr(target))
    }
}

impl<T: ?Sized> Clone for BackRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
            what: self.what,
        }
    }
}

impl<T: ?Sized> fmt::Debug for BackRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackRef")
            .field("what", &self.what)
            .field("alive", &self.is_alive())
            .finish()
    }
}
