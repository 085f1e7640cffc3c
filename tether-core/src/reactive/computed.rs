//! Computed Values
//!
//! A Computed is a cached derived value backed by a lazy watcher.
//!
//! # How Computed Values Work
//!
//! 1. Creating one evaluates nothing. The watcher starts dirty.
//!
//! 2. The first read evaluates the getter and caches the result.
//!
//! 3. When a dependency changes, the watcher only marks itself dirty.
//!    No work happens until the next read.
//!
//! 4. A read from inside another evaluation also forwards the computed
//!    value's dependencies to that evaluation, so a render that reads a
//!    computed value re-runs when the computed value's inputs change.
//!
//! Computed values that are never read stay dirty and cost nothing.

use std::fmt;

use super::context::ReactiveContext;
use super::watch::WatchTarget;
use super::watcher::Watcher;
use crate::error::EvalError;
use crate::observer::{Object, Value};

/// A lazily evaluated, cached derived value.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
}

impl Computed {
    /// Create a computed value. The getter does not run until first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> Result<Value, EvalError> + 'static,
    {
        Self {
            watcher: Watcher::new_lazy(None, WatchTarget::getter(getter)),
        }
    }

    /// Create a computed value attached to an owner object, which is handed
    /// to the error handler if the getter fails.
    pub fn with_owner<F>(owner: &Object, getter: F) -> Self
    where
        F: Fn() -> Result<Value, EvalError> + 'static,
    {
        Self {
            watcher: Watcher::new_lazy(Some(owner), WatchTarget::getter(getter)),
        }
    }

    /// Read the value, recomputing first if a dependency changed.
    pub fn get(&self) -> Result<Value, EvalError> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if ReactiveContext::is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The lazy watcher behind this value.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.watcher.id())
            .field("dirty", &self.is_dirty())
            .field("value", &self.watcher.value())
            .finish()
    }
}
