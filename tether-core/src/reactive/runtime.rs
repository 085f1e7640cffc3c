//! Reactive Runtime
//!
//! The runtime is the arena that connects dependencies and subscribers.
//! Neither side owns the other: a dependency record holds subscriber ids,
//! a watcher holds dependency ids, and the registry maps subscriber ids to
//! weak references. Tearing a subscriber down is a removal of its edges,
//! never a matter of breaking reference cycles.
//!
//! # How It Works
//!
//! 1. When a subscriber is created, it registers with the runtime.
//!
//! 2. When a subscriber reads a reactive slot, the runtime records the
//!    edge from the slot's dependency to the subscriber.
//!
//! 3. When a slot changes, the runtime snapshots the dependency's
//!    subscribers, sorts them by id and calls `update` on each one that is
//!    still alive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

use super::subscriber::{DepId, Subscriber, SubscriberId};

#[derive(Default)]
struct Arena {
    /// Dependency records: subscribers in insertion order, no duplicates.
    deps: HashMap<DepId, IndexSet<SubscriberId>>,
    /// Live subscribers.
    registry: HashMap<SubscriberId, Weak<dyn Subscriber>>,
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a subscriber so dependencies can reach it by id.
    pub fn register(subscriber: Weak<dyn Subscriber>, id: SubscriberId) {
        ARENA.with(|arena| arena.borrow_mut().registry.insert(id, subscriber));
    }

    /// Forget a subscriber.
    pub fn unregister(id: SubscriberId) {
        let _ = ARENA.try_with(|arena| arena.borrow_mut().registry.remove(&id));
    }

    /// Look up a live subscriber.
    pub fn lookup(id: SubscriberId) -> Option<Rc<dyn Subscriber>> {
        ARENA.with(|arena| arena.borrow().registry.get(&id).and_then(Weak::upgrade))
    }

    /// Add `subscriber` to the dependency's subscriber set. Idempotent.
    pub fn add_subscriber(dep: DepId, subscriber: SubscriberId) {
        ARENA.with(|arena| {
            arena
                .borrow_mut()
                .deps
                .entry(dep)
                .or_default()
                .insert(subscriber);
        });
    }

    /// Remove `subscriber` from the dependency's subscriber set. Idempotent.
    pub fn remove_subscriber(dep: DepId, subscriber: SubscriberId) {
        let _ = ARENA.try_with(|arena| {
            if let Some(subs) = arena.borrow_mut().deps.get_mut(&dep) {
                subs.shift_remove(&subscriber);
            }
        });
    }

    /// Drop a dependency's record entirely.
    pub fn remove_dep(dep: DepId) {
        let _ = ARENA.try_with(|arena| arena.borrow_mut().deps.remove(&dep));
    }

    /// Snapshot of a dependency's subscribers, in insertion order.
    pub fn subscribers(dep: DepId) -> Vec<SubscriberId> {
        ARENA.with(|arena| {
            arena
                .borrow()
                .deps
                .get(&dep)
                .map(|subs| subs.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Notify every subscriber of a dependency.
    ///
    /// Works on a snapshot, so subscribers may add or remove themselves
    /// while being notified. The snapshot is sorted by id so subscribers fire
    /// in creation order even when they run synchronously.
    pub fn notify(dep: DepId) {
        let mut ids = Self::subscribers(dep);
        if ids.is_empty() {
            return;
        }
        ids.sort_unstable();
        tracing::trace!(dep = dep.raw(), count = ids.len(), "notify");

        for id in ids {
            if let Some(subscriber) = Self::lookup(id) {
                subscriber.update();
            }
        }
    }

    /// Number of live dependency records, for diagnostics.
    pub fn dep_count() -> usize {
        ARENA.with(|arena| arena.borrow().deps.len())
    }
}
