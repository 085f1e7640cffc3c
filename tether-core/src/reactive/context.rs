//! Reactive Context
//!
//! The reactive context tracks which subscriber is currently evaluating.
//! This enables automatic dependency tracking: when a reactive slot is read,
//! the current subscriber is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently evaluating subscriber.
//! When a watcher starts evaluating, it pushes itself onto the stack. When
//! the evaluation completes, the guard pops it, even if the evaluation failed
//! or panicked.
//!
//! The stack supports nested evaluation (a computed value reading another
//! computed value). An entry may also be empty, which suspends tracking for
//! the duration of the entry: see [`untrack`].

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any reactive slot that is read will
    /// register the subscriber as a dependent.
    pub fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let subscriber_id = Some(subscriber.id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(Some(subscriber)));
        Self { subscriber_id }
    }

    /// Enter a context in which reads are not tracked.
    pub fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(None));
        Self { subscriber_id: None }
    }

    /// Check if a subscriber is currently collecting dependencies.
    pub fn is_tracking() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Get the subscriber currently collecting dependencies, if any.
    pub fn current() -> Option<Rc<dyn Subscriber>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        Self::current().map(|subscriber| subscriber.id())
    }

    /// Number of entries on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.as_ref().map(|s| s.id()),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` without registering any dependencies.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::reactive::subscriber::DepId;

    struct Marker(SubscriberId);

    impl Subscriber for Marker {
        fn id(&self) -> SubscriberId {
            self.0
        }
        fn add_dep(&self, _dep: DepId) {}
        fn update(&self) {}
        fn run(&self) -> Result<(), EvalError> {
            Ok(())
        }
    }

    fn marker() -> Rc<dyn Subscriber> {
        Rc::new(Marker(SubscriberId::new()))
    }

    #[test]
    fn context_tracks_subscriber() {
        let sub = marker();
        let id = sub.id();

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(sub);

            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_tracking());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts() {
        let outer = marker();
        let inner = marker();
        let (id1, id2) = (outer.id(), inner.id());

        {
            let _ctx1 = ReactiveContext::enter(outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untrack_suspends_tracking() {
        let _ctx = ReactiveContext::enter(marker());
        assert!(ReactiveContext::is_tracking());

        let inside = untrack(ReactiveContext::is_tracking);
        assert!(!inside);
        assert!(ReactiveContext::is_tracking());
    }

    #[test]
    fn stack_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(marker());
            panic!("evaluation failed");
        });
        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
