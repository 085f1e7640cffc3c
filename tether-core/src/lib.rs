//! Tether Core
//!
//! This crate provides the dependency-tracking and update-scheduling engine
//! of the Tether declarative UI framework. It implements:
//!
//! - Instrumented data (objects and arrays whose reads and writes are observed)
//! - Watchers, computed values and user watchers with automatic dependency tracking
//! - A batching scheduler that re-runs watchers once per tick, in creation order
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `observer`: the value model and its instrumentation (`observe`, `set`, `del`)
//! - `reactive`: dependencies, watchers and the tracking context
//! - `scheduler`: the flush queue and the next-tick queue
//! - `config`: per-thread settings and the error handler
//!
//! Everything is single-threaded. Values are `Rc`-based handles and all
//! engine state is thread-local.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::{observe, Object, Value, WatchOptions, Watcher};
//! use tether_core::scheduler::run_until_idle;
//!
//! // Make some state reactive
//! let state: Object = [("count", 0)].into_iter().collect();
//! observe(&Value::from(state.clone()));
//!
//! // Render whenever it changes
//! let reader = state.clone();
//! let render = Watcher::render(None, move || {
//!     println!("Count: {:?}", reader.get("count"));
//!     Ok(Value::Undefined)
//! }, WatchOptions::default())?;
//!
//! // Update the state; the render is queued, not run
//! state.set("count", 5);
//! state.set("count", 6);
//!
//! // Next tick: renders once, prints "Count: Number(6)"
//! run_until_idle();
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::EvalError;
pub use observer::{del, observe, set, traverse, Array, Key, Object, Value};
pub use reactive::{create_watcher, untrack, Computed, Dep, Unwatch, WatchOptions, WatchTarget, Watcher};
pub use scheduler::{next_tick, tick};
