//! Next-Tick Queue
//!
//! Callbacks registered with [`next_tick`] run together, in registration
//! order, once the current synchronous work is done. What "done" means is up
//! to the [`TickDriver`]:
//!
//! - `Manual`: nothing happens until the host calls [`run_pending`] (or
//!   [`run_until_idle`]). This is the default and what the tests use.
//! - `TokioLocal`: the first callback of a tick spawns a task on the current
//!   tokio `LocalSet` that drains the queue. Requires running inside a
//!   `LocalSet`, since the engine's values are `!Send`.

use std::cell::RefCell;

use tokio::sync::oneshot;

type Task = Box<dyn FnOnce()>;

/// How pending ticks get drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TickDriver {
    /// The host drains the queue by calling [`run_pending`].
    #[default]
    Manual,
    /// A local task is spawned on the current tokio `LocalSet`.
    TokioLocal,
}

#[derive(Default)]
struct TickQueue {
    callbacks: Vec<Task>,
    /// A drain has been requested and not yet performed.
    pending: bool,
    driver: TickDriver,
}

thread_local! {
    static TICKS: RefCell<TickQueue> = RefCell::new(TickQueue::default());
}

/// Select how ticks are driven on this thread.
pub fn set_driver(driver: TickDriver) {
    TICKS.with(|ticks| ticks.borrow_mut().driver = driver);
}

pub fn driver() -> TickDriver {
    TICKS.with(|ticks| ticks.borrow().driver)
}

/// Defer `callback` to the next tick.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    let spawn = TICKS.with(|ticks| {
        let mut ticks = ticks.borrow_mut();
        ticks.callbacks.push(Box::new(callback));
        if ticks.pending {
            return None;
        }
        ticks.pending = true;
        Some(ticks.driver)
    });

    if let Some(TickDriver::TokioLocal) = spawn {
        tokio::task::spawn_local(async {
            run_pending();
        });
    }
}

/// Resolves once the callbacks queued so far have run.
///
/// With the manual driver, something else has to call [`run_pending`].
pub async fn tick() {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    let _ = rx.await;
}

/// Run every callback queued so far. Callbacks queued while these run are
/// left for the next tick. Returns how many callbacks ran.
pub fn run_pending() -> usize {
    let callbacks = TICKS.with(|ticks| {
        let mut ticks = ticks.borrow_mut();
        ticks.pending = false;
        std::mem::take(&mut ticks.callbacks)
    });

    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }
    count
}

/// Keep running ticks until no callbacks are left. Returns how many ran.
pub fn run_until_idle() -> usize {
    let mut total = 0;
    loop {
        let ran = run_pending();
        if ran == 0 {
            return total;
        }
        total += ran;
    }
}

/// Whether any callback is waiting for the next tick.
pub fn is_pending() -> bool {
    TICKS.with(|ticks| !ticks.borrow().callbacks.is_empty())
}
