//! Reactive Primitives
//!
//! This module implements the subscriber side of the engine: dependencies,
//! watchers, computed values and user watchers. Together with
//! [`crate::observer`] they form Tether's dependency tracking.
//!
//! # Concepts
//!
//! ## Dependencies
//!
//! A [`Dep`] is an observable channel. Every reactive property and every
//! observed container owns one. Reading the slot registers the evaluating
//! subscriber with its dependency; writing notifies it.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a computation inside a tracking context and
//! records every dependency it read. When one of them notifies, the watcher
//! is re-run: immediately, on the next scheduler flush, or lazily on the
//! next read.
//!
//! ## Computed values
//!
//! A [`Computed`] is a lazy watcher with a cache. It recomputes on read, and
//! only after one of its inputs changed.
//!
//! # Implementation Notes
//!
//! The engine is single-threaded and uses thread-local state: the context
//! stack (see [`ReactiveContext`]) and the dependency arena (see
//! [`Runtime`]). Dependencies and subscribers refer to each other by id, so
//! nothing here forms a reference cycle.

mod computed;
mod context;
mod dep;
mod runtime;
mod subscriber;
mod watch;
mod watcher;

pub use computed::Computed;
pub use context::{untrack, ReactiveContext};
pub use dep::Dep;
pub use runtime::Runtime;
pub use subscriber::{DepId, Subscriber, SubscriberId};
pub use watch::{create_watcher, Unwatch, WatchTarget};
pub use watcher::{Callback, Getter, Hook, WatchOptions, Watcher};
