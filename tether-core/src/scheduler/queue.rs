//! Flush Queue
//!
//! Watchers that are neither lazy nor sync queue themselves here when a
//! dependency changes. The queue is flushed once per tick.
//!
//! # Algorithm
//!
//! 1. `queue_subscriber` adds an id unless it is already pending, and asks
//!    for a flush on the next tick if none is scheduled.
//! 2. `flush` sorts the pending ids ascending, so watchers run in creation
//!    order (an owner before the watchers it creates).
//! 3. Each watcher gets its `before_run` hook, then `run`.
//! 4. A watcher queued while the flush is running is inserted at its sorted
//!    position among the ids after the cursor. If its id is below the
//!    cursor it runs next.
//! 5. Once the queue is drained, the state is reset and `after_flush` runs
//!    for every watcher that ran, in id order.
//!
//! A watcher that re-queues itself more than `max_update_count` times within
//! one flush is reported and skipped for the rest of that flush.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::tick::next_tick;
use crate::config;
use crate::reactive::{Runtime, SubscriberId};

#[derive(Default)]
struct FlushQueue {
    queue: Vec<SubscriberId>,
    /// Ids currently pending.
    has: HashSet<SubscriberId>,
    /// Re-queue counts within the current flush.
    circular: HashMap<SubscriberId, u32>,
    /// Ids excluded for the rest of the current flush.
    halted: HashSet<SubscriberId>,
    /// A flush has been scheduled and has not finished.
    waiting: bool,
    flushing: bool,
    /// Cursor into `queue` while flushing.
    index: usize,
}

impl FlushQueue {
    fn insert(&mut self, id: SubscriberId) {
        if !self.flushing {
            self.queue.push(id);
            return;
        }
        let mut at = self.queue.len();
        while at > self.index + 1 && self.queue[at - 1] > id {
            at -= 1;
        }
        self.queue.insert(at, id);
    }
}

thread_local! {
    static QUEUE: RefCell<FlushQueue> = RefCell::new(FlushQueue::default());
}

/// Queue a subscriber for the next flush. Ids already pending are ignored.
pub fn queue_subscriber(id: SubscriberId) {
    let schedule = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.halted.contains(&id) || !queue.has.insert(id) {
            return false;
        }
        queue.insert(id);
        tracing::trace!(subscriber = id.raw(), flushing = queue.flushing, "queued");

        if queue.waiting {
            return false;
        }
        queue.waiting = true;
        true
    });

    if !schedule {
        return;
    }
    if config::with(|config| config.async_mode) {
        next_tick(flush);
    } else {
        flush();
    }
}

/// Run every queued subscriber now.
///
/// Normally invoked by the tick queue. Calling it while a flush is already in
/// progress does nothing.
pub fn flush() {
    let started = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.flushing {
            return None;
        }
        queue.flushing = true;
        queue.index = 0;
        queue.queue.sort_unstable();
        Some(queue.queue.len())
    });
    let Some(count) = started else {
        return;
    };
    tracing::debug!(count, "flush started");

    let limit = config::with(|config| config.max_update_count);

    loop {
        let next = QUEUE.with(|queue| {
            let queue = queue.borrow();
            queue.queue.get(queue.index).copied()
        });
        let Some(id) = next else {
            break;
        };

        let skip = QUEUE.with(|queue| queue.borrow().halted.contains(&id));
        if !skip {
            let label = match Runtime::lookup(id) {
                Some(subscriber) => {
                    subscriber.before_run();
                    QUEUE.with(|queue| queue.borrow_mut().has.remove(&id));
                    if let Err(error) = subscriber.run() {
                        subscriber.report_error(&error);
                    }
                    subscriber.label().to_owned()
                }
                None => {
                    QUEUE.with(|queue| queue.borrow_mut().has.remove(&id));
                    String::from("subscriber")
                }
            };
            if check_circular(id, limit) {
                tracing::warn!(
                    subscriber = id.raw(),
                    expression = %label,
                    limit,
                    "you may have an infinite update loop; skipping the watcher for the rest of this flush"
                );
            }
        }

        QUEUE.with(|queue| queue.borrow_mut().index += 1);
    }

    let mut ran = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let mut ran = std::mem::take(&mut queue.queue);
        ran.retain(|id| !queue.halted.contains(id));
        *queue = FlushQueue::default();
        ran
    });
    ran.sort_unstable();
    ran.dedup();
    tracing::debug!(ran = ran.len(), "flush finished");

    for id in ran {
        if let Some(subscriber) = Runtime::lookup(id) {
            subscriber.after_flush();
        }
    }
}

/// After a run: if the subscriber queued itself again, count it, and halt it
/// once it crosses the limit. Returns whether it was halted.
fn check_circular(id: SubscriberId, limit: u32) -> bool {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if !queue.has.contains(&id) {
            return false;
        }
        let count = {
            let count = queue.circular.entry(id).or_insert(0);
            *count += 1;
            *count
        };
        if count <= limit {
            return false;
        }

        queue.has.remove(&id);
        queue.halted.insert(id);
        let cursor = queue.index;
        let mut position = 0;
        queue.queue.retain(|queued| {
            let keep = position <= cursor || *queued != id;
            position += 1;
            keep
        });
        true
    })
}

/// Number of queued subscribers that have not run yet.
pub fn pending() -> usize {
    QUEUE.with(|queue| {
        let queue = queue.borrow();
        if queue.flushing {
            queue.queue.len().saturating_sub(queue.index + 1)
        } else {
            queue.queue.len()
        }
    })
}

/// Whether a flush is in progress.
pub fn is_flushing() -> bool {
    QUEUE.with(|queue| queue.borrow().flushing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::reactive::{DepId, Subscriber};
    use crate::scheduler::run_until_idle;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    type Action = Box<dyn Fn(&Recorder)>;

    struct Recorder {
        id: SubscriberId,
        log: Rc<RefCell<Vec<String>>>,
        runs: Cell<u32>,
        on_run: RefCell<Option<Action>>,
    }

    impl Recorder {
        fn new(log: &Rc<RefCell<Vec<String>>>) -> Rc<Self> {
            let recorder = Rc::new(Self {
                id: SubscriberId::new(),
                log: log.clone(),
                runs: Cell::new(0),
                on_run: RefCell::new(None),
            });
            let weak: Weak<dyn Subscriber> = Rc::downgrade(&recorder) as Weak<dyn Subscriber>;
            Runtime::register(weak, recorder.id);
            recorder
        }

        fn on_run(&self, action: impl Fn(&Recorder) + 'static) {
            *self.on_run.borrow_mut() = Some(Box::new(action));
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> SubscriberId {
            self.id
        }
        fn add_dep(&self, _dep: DepId) {}
        fn update(&self) {
            queue_subscriber(self.id);
        }
        fn run(&self) -> Result<(), EvalError> {
            self.runs.set(self.runs.get() + 1);
            self.log.borrow_mut().push(format!("run {}", self.id.raw()));
            if let Some(action) = &*self.on_run.borrow() {
                action(self);
            }
            Ok(())
        }
        fn after_flush(&self) {
            self.log.borrow_mut().push(format!("after {}", self.id.raw()));
        }
    }

    #[test]
    fn dedups_and_sorts() {
        let log = Rc::default();
        let first = Recorder::new(&log);
        let second = Recorder::new(&log);

        queue_subscriber(second.id);
        queue_subscriber(first.id);
        queue_subscriber(second.id);
        assert_eq!(pending(), 2);

        run_until_idle();
        assert_eq!(first.runs.get(), 1);
        assert_eq!(second.runs.get(), 1);
        assert_eq!(
            *log.borrow(),
            vec![
                format!("run {}", first.id.raw()),
                format!("run {}", second.id.raw()),
                format!("after {}", first.id.raw()),
                format!("after {}", second.id.raw()),
            ]
        );
        assert_eq!(pending(), 0);
    }

    #[test]
    fn mid_flush_insertion_keeps_order() {
        let log = Rc::default();
        let s1 = Recorder::new(&log);
        let s2 = Recorder::new(&log);
        let s3 = Recorder::new(&log);
        let s4 = Recorder::new(&log);

        // s1 queues s3 while s2 and s4 are pending.
        let target = s3.id;
        s1.on_run(move |_| queue_subscriber(target));
        queue_subscriber(s4.id);
        queue_subscriber(s2.id);
        queue_subscriber(s1.id);
        run_until_idle();

        let runs: Vec<String> = log.borrow().iter().filter(|l| l.starts_with("run")).cloned().collect();
        let expected: Vec<String> = [&s1, &s2, &s3, &s4]
            .iter()
            .map(|p| format!("run {}", p.id.raw()))
            .collect();
        assert_eq!(runs, expected);
    }

    #[test]
    fn earlier_id_queued_mid_flush_runs_next() {
        let log = Rc::default();
        let s1 = Recorder::new(&log);
        let s2 = Recorder::new(&log);
        let s3 = Recorder::new(&log);

        let target = s1.id;
        s2.on_run(move |_| queue_subscriber(target));
        queue_subscriber(s3.id);
        queue_subscriber(s2.id);
        run_until_idle();

        let runs: Vec<String> = log.borrow().iter().filter(|l| l.starts_with("run")).cloned().collect();
        assert_eq!(
            runs,
            vec![
                format!("run {}", s2.id.raw()),
                format!("run {}", s1.id.raw()),
                format!("run {}", s3.id.raw()),
            ]
        );
    }

    #[test]
    fn runaway_subscriber_is_halted() {
        let log = Rc::default();
        let looping = Recorder::new(&log);
        let after = Recorder::new(&log);
        looping.on_run(|this| queue_subscriber(this.id));

        queue_subscriber(looping.id);
        queue_subscriber(after.id);
        run_until_idle();

        let limit = config::with(|config| config.max_update_count);
        assert_eq!(looping.runs.get(), limit + 1);
        assert_eq!(after.runs.get(), 1);
        assert!(!is_flushing());

        // The halt only lasts for that flush.
        looping.on_run(|_| {});
        queue_subscriber(looping.id);
        run_until_idle();
        assert_eq!(looping.runs.get(), limit + 2);
    }

    #[test]
    fn sync_mode_flushes_immediately() {
        config::update(|config| config.async_mode = false);
        let log = Rc::default();
        let recorder = Recorder::new(&log);

        queue_subscriber(recorder.id);
        assert_eq!(recorder.runs.get(), 1);
        config::update(|config| config.async_mode = true);
    }
}
