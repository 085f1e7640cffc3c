//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive slots.
//! This includes computed values, user watchers and render functions.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config;
use crate::error::EvalError;

/// Unique identifier for a subscriber.
///
/// Ids are handed out in creation order. The scheduler flushes in ascending
/// id order, so a subscriber created before another always runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a dependency, also in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Anything that can be notified when one of its dependencies changes.
///
/// The dependency arena and the scheduler only ever talk to subscribers
/// through this trait, by id.
pub trait Subscriber {
    /// The subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Human-readable name used in diagnostics.
    fn label(&self) -> &str {
        "subscriber"
    }

    /// Record that the evaluation in progress read the given dependency.
    fn add_dep(&self, dep: DepId);

    /// One of the subscriber's dependencies changed.
    fn update(&self);

    /// Re-run the subscriber as part of a scheduler flush.
    fn run(&self) -> Result<(), EvalError>;

    /// Hook invoked by the scheduler right before `run`.
    fn before_run(&self) {}

    /// Hook invoked once the flush that ran this subscriber completes.
    fn after_flush(&self) {}

    /// Report an error from `run` that has nowhere else to go.
    fn report_error(&self, error: &EvalError) {
        config::handle_error(error, None, "subscriber");
    }
}
