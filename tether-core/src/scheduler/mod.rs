//! Update Scheduler
//!
//! Batches watcher re-runs. Any number of writes within one synchronous
//! burst queue each affected watcher once; the queue is flushed on the next
//! tick, in watcher creation order.

mod queue;
mod tick;

pub use queue::{flush, is_flushing, pending, queue_subscriber};
pub use tick::{driver, is_pending, next_tick, run_pending, run_until_idle, set_driver, tick, TickDriver};
