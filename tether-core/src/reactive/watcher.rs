//! Watcher Implementation
//!
//! A Watcher evaluates a target computation, remembers which dependencies
//! the evaluation read, and re-evaluates when one of them notifies.
//!
//! # How Watchers Work
//!
//! 1. `get` pushes the watcher onto the reactive context, runs the target
//!    and pops it again. Every dependency read in between is recorded.
//!
//! 2. After the run, the recorded set replaces the previous one: newly read
//!    dependencies gain this watcher as a subscriber, dependencies that were
//!    not read this time lose it. Conditional reads therefore reshape the
//!    graph on every run.
//!
//! 3. When a dependency notifies, `update` decides what happens next:
//!    - lazy watchers (computed values) only mark themselves dirty,
//!    - sync watchers re-run on the spot,
//!    - everything else is queued on the scheduler.
//!
//! # Variants
//!
//! - Render watchers have no callback; re-running the target is the point.
//! - User watchers get a `(new, old)` callback and report their own errors
//!   to the error handler instead of returning them.
//! - Deep watchers traverse their result so nested writes count too.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

use super::context::ReactiveContext;
use super::dep::depend_on;
use super::runtime::Runtime;
use super::subscriber::{DepId, Subscriber, SubscriberId};
use super::watch::WatchTarget;
use crate::config;
use crate::error::EvalError;
use crate::observer::{traverse, Object, Value};
use crate::scheduler;

/// A target computation.
pub type Getter = Rc<dyn Fn() -> Result<Value, EvalError>>;

/// A change callback, invoked with `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<(), EvalError>>;

/// A lifecycle hook.
pub type Hook = Rc<dyn Fn()>;

/// Watcher configuration.
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Traverse the result so nested changes trigger too.
    pub deep: bool,
    /// Report errors to the error handler instead of returning them.
    pub user: bool,
    /// Only recompute on demand (computed values).
    pub lazy: bool,
    /// Re-run synchronously instead of through the scheduler.
    pub sync: bool,
    /// Invoke the callback once right after creation. Honoured by
    /// [`create_watcher`](super::create_watcher).
    pub immediate: bool,
    /// Runs right before each scheduled re-run.
    pub before: Option<Hook>,
    /// Runs after the flush that re-ran the watcher.
    pub after: Option<Hook>,
}

impl WatchOptions {
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.user = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    pub fn after(mut self, hook: impl Fn() + 'static) -> Self {
        self.after = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("immediate", &self.immediate)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

pub(crate) struct WatcherInner {
    this: Weak<WatcherInner>,
    id: SubscriberId,
    owner: Option<Object>,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    before: Option<Hook>,
    after: Option<Hook>,
    /// Dependencies read by the last completed evaluation.
    deps: RefCell<IndexSet<DepId>>,
    /// Dependencies read by the evaluation in progress.
    new_deps: RefCell<IndexSet<DepId>>,
    evaluations: Cell<usize>,
}

impl WatcherInner {
    fn get(&self) -> Result<Value, EvalError> {
        let Some(this) = self.this.upgrade() else {
            return Ok(Value::Undefined);
        };
        self.evaluations.set(self.evaluations.get() + 1);

        let result = {
            let _ctx = ReactiveContext::enter(this);
            let result = match (self.getter)() {
                Ok(value) => Ok(value),
                Err(error) if self.user => {
                    let info = format!("getter for watcher \"{}\"", self.expression);
                    config::handle_error(&error, self.owner.as_ref(), &info);
                    Ok(Value::Undefined)
                }
                Err(error) => Err(error),
            };
            if self.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };

        self.cleanup_deps();
        result
    }

    fn cleanup_deps(&self) {
        let current = mem::take(&mut *self.new_deps.borrow_mut());
        let previous = mem::replace(&mut *self.deps.borrow_mut(), current);
        let deps = self.deps.borrow();
        for dep in previous {
            if !deps.contains(&dep) {
                Runtime::remove_subscriber(dep, self.id);
            }
        }
    }

    fn evaluate(&self) -> Result<(), EvalError> {
        let value = self.get()?;
        *self.value.borrow_mut() = value;
        self.dirty.set(false);
        Ok(())
    }

    fn depend(&self) {
        let deps: Vec<DepId> = self.deps.borrow().iter().copied().collect();
        for dep in deps {
            depend_on(dep);
        }
    }

    fn teardown(&self) {
        if !self.active.replace(false) {
            return;
        }
        let deps = mem::take(&mut *self.deps.borrow_mut());
        for dep in deps {
            Runtime::remove_subscriber(dep, self.id);
        }
        Runtime::unregister(self.id);
        tracing::debug!(watcher = self.id.raw(), expression = %self.expression, "watcher torn down");
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn label(&self) -> &str {
        &self.expression
    }

    fn add_dep(&self, dep: DepId) {
        let fresh = self.new_deps.borrow_mut().insert(dep);
        if fresh && !self.deps.borrow().contains(&dep) {
            Runtime::add_subscriber(dep, self.id);
        }
    }

    fn update(&self) {
        if !self.active.get() {
            return;
        }
        if self.lazy {
            self.dirty.set(true);
        } else if self.sync {
            if let Err(error) = self.run() {
                self.report_error(&error);
            }
        } else {
            scheduler::queue_subscriber(self.id);
        }
    }

    fn run(&self) -> Result<(), EvalError> {
        if !self.active.get() {
            return Ok(());
        }

        let value = self.get()?;
        let old = self.value.borrow().clone();
        if value.same(&old) && !value.is_container() && !self.deep {
            return Ok(());
        }
        *self.value.borrow_mut() = value.clone();

        let Some(callback) = &self.callback else {
            return Ok(());
        };
        match callback(&value, &old) {
            Err(error) if self.user => {
                let info = format!("callback for watcher \"{}\"", self.expression);
                config::handle_error(&error, self.owner.as_ref(), &info);
                Ok(())
            }
            result => result,
        }
    }

    fn before_run(&self) {
        if let Some(before) = &self.before {
            before();
        }
    }

    fn after_flush(&self) {
        if let (true, Some(after)) = (self.active.get(), &self.after) {
            after();
        }
    }

    fn report_error(&self, error: &EvalError) {
        let info = format!("watcher \"{}\"", self.expression);
        config::handle_error(error, self.owner.as_ref(), &info);
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A subscriber that re-evaluates its target when its dependencies change.
///
/// Cloning shares the same watcher. Dropping the last handle tears it down.
///
/// # Example
///
/// ```rust,ignore
/// let state: Object = [("count", 0)].into_iter().collect();
/// observe(&Value::from(state.clone()));
///
/// let render = Watcher::render(Some(&state), {
///     let state = state.clone();
///     move || {
///         println!("count is {:?}", state.get("count"));
///         Ok(Value::Undefined)
///     }
/// }, WatchOptions::default())?;
///
/// state.set("count", 1);
/// scheduler::run_until_idle(); // prints "count is Number(1)"
/// ```
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher.
    ///
    /// Unless the watcher is lazy, the target is evaluated once right away to
    /// collect the initial dependencies; a non-user watcher whose first
    /// evaluation fails is returned as an error.
    pub fn new(
        owner: Option<&Object>,
        target: impl Into<WatchTarget>,
        callback: Option<Callback>,
        options: WatchOptions,
    ) -> Result<Self, EvalError> {
        let watcher = Self::build(owner, target.into(), callback, &options);
        if !options.lazy {
            let value = watcher.inner.get()?;
            *watcher.inner.value.borrow_mut() = value;
        }
        Ok(watcher)
    }

    /// Create a render watcher: no callback, the target is the render.
    pub fn render<F>(owner: Option<&Object>, render: F, options: WatchOptions) -> Result<Self, EvalError>
    where
        F: Fn() -> Result<Value, EvalError> + 'static,
    {
        Self::new(owner, WatchTarget::getter(render), None, options)
    }

    /// Create a lazy watcher without evaluating it.
    pub(crate) fn new_lazy(owner: Option<&Object>, target: WatchTarget) -> Self {
        Self::build(owner, target, None, &WatchOptions::default().lazy())
    }

    fn build(
        owner: Option<&Object>,
        target: WatchTarget,
        callback: Option<Callback>,
        options: &WatchOptions,
    ) -> Self {
        let (getter, expression) = target.into_getter(owner);
        let inner = Rc::new_cyclic(|this| WatcherInner {
            this: this.clone(),
            id: SubscriberId::new(),
            owner: owner.cloned(),
            expression,
            getter,
            callback,
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(options.lazy),
            active: Cell::new(true),
            deep: options.deep,
            user: options.user,
            lazy: options.lazy,
            sync: options.sync,
            before: options.before.clone(),
            after: options.after.clone(),
            deps: RefCell::new(IndexSet::new()),
            new_deps: RefCell::new(IndexSet::new()),
            evaluations: Cell::new(0),
        });

        let weak: Weak<dyn Subscriber> = Rc::downgrade(&inner) as Weak<dyn Subscriber>;
        Runtime::register(weak, inner.id);
        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Label used in diagnostics: the watched path, or a placeholder for
    /// getter closures.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    /// Dependencies read by the last evaluation.
    pub fn deps(&self) -> Vec<DepId> {
        self.inner.deps.borrow().iter().copied().collect()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    /// How many times the target has been evaluated.
    pub fn evaluation_count(&self) -> usize {
        self.inner.evaluations.get()
    }

    /// Evaluate the target, cache the value and clear the dirty flag.
    pub fn evaluate(&self) -> Result<(), EvalError> {
        self.inner.evaluate()
    }

    /// Re-run: evaluate and, if the value changed, invoke the callback.
    pub fn run(&self) -> Result<(), EvalError> {
        Subscriber::run(&*self.inner)
    }

    /// React to a dependency change.
    pub fn update(&self) {
        Subscriber::update(&*self.inner);
    }

    /// Make the subscriber currently evaluating depend on everything this
    /// watcher depends on.
    pub fn depend(&self) {
        self.inner.depend();
    }

    /// Unsubscribe from every dependency. Idempotent; a torn-down watcher
    /// ignores later notifications.
    pub fn teardown(&self) {
        self.inner.teardown();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("dirty", &self.is_dirty())
            .field("active", &self.is_active())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::observe;
    use crate::scheduler::run_until_idle;

    fn state(pairs: &[(&str, i32)]) -> Object {
        let obj: Object = pairs.iter().map(|(k, v)| (*k, *v)).collect();
        observe(&Value::from(obj.clone()));
        obj
    }

    fn reader(obj: &Object, key: &'static str) -> impl Fn() -> Result<Value, EvalError> {
        let obj = obj.clone();
        move || Ok(obj.get(key))
    }

    #[test]
    fn evaluates_on_creation() {
        let obj = state(&[("a", 1)]);
        let watcher = Watcher::render(None, reader(&obj, "a"), WatchOptions::default()).unwrap();

        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(watcher.evaluation_count(), 1);
        assert_eq!(watcher.dependency_count(), 1);
        assert_eq!(watcher.deps(), vec![obj.property_dep("a").unwrap()]);
    }

    #[test]
    fn lazy_watcher_waits() {
        let obj = state(&[("a", 1)]);
        let watcher = Watcher::new(
            None,
            WatchTarget::getter(reader(&obj, "a")),
            None,
            WatchOptions::default().lazy(),
        )
        .unwrap();

        assert!(watcher.is_dirty());
        assert_eq!(watcher.evaluation_count(), 0);

        watcher.evaluate().unwrap();
        assert!(!watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(1));

        obj.set("a", 2);
        assert!(watcher.is_dirty());
        assert_eq!(watcher.evaluation_count(), 1);
    }

    #[test]
    fn sync_watcher_runs_immediately() {
        let obj = state(&[("a", 1)]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let callback: Callback = Rc::new(move |new, old| {
            sink.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        });
        let _watcher = Watcher::new(
            None,
            WatchTarget::getter(reader(&obj, "a")),
            Some(callback),
            WatchOptions::default().sync(),
        )
        .unwrap();

        obj.set("a", 2);
        obj.set("a", 3);
        assert_eq!(
            *seen.borrow(),
            vec![
                (Value::from(2), Value::from(1)),
                (Value::from(3), Value::from(2)),
            ]
        );
    }

    #[test]
    fn unchanged_primitive_skips_callback() {
        let obj = state(&[("a", 1), ("b", 1)]);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let callback: Callback = Rc::new(move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        let watched = obj.clone();
        let watcher = Watcher::new(
            None,
            WatchTarget::getter(move || Ok(Value::from(watched.get("a").is_truthy() && watched.get("b").is_truthy()))),
            Some(callback),
            WatchOptions::default().sync(),
        )
        .unwrap();

        obj.set("a", 5);
        assert_eq!(watcher.evaluation_count(), 2);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn teardown_is_idempotent() {
        let obj = state(&[("a", 1)]);
        let watcher = Watcher::render(None, reader(&obj, "a"), WatchOptions::default().sync()).unwrap();
        let dep = obj.property_dep("a").unwrap();
        assert_eq!(Runtime::subscribers(dep), vec![watcher.id()]);

        watcher.teardown();
        watcher.teardown();
        assert!(!watcher.is_active());
        assert!(Runtime::subscribers(dep).is_empty());

        obj.set("a", 2);
        assert_eq!(watcher.evaluation_count(), 1);
    }

    #[test]
    fn dropping_the_last_handle_unsubscribes() {
        let obj = state(&[("a", 1)]);
        let watcher = Watcher::render(None, reader(&obj, "a"), WatchOptions::default()).unwrap();
        let (id, dep) = (watcher.id(), obj.property_dep("a").unwrap());

        drop(watcher);
        assert!(Runtime::subscribers(dep).is_empty());
        assert!(Runtime::lookup(id).is_none());
    }

    #[test]
    fn render_error_propagates() {
        let result = Watcher::render(None, || Err(EvalError::msg("broken")), WatchOptions::default());
        assert_eq!(result.unwrap_err(), EvalError::msg("broken"));
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn user_getter_error_is_reported() {
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = reports.clone();
        config::set_error_handler(move |err, _, info| {
            sink.borrow_mut().push(format!("{info}: {err}"));
        });

        let watcher = Watcher::new(
            None,
            WatchTarget::getter(|| Err(EvalError::msg("nope"))),
            None,
            WatchOptions::default().user(),
        )
        .unwrap();
        config::clear_error_handler();

        assert!(watcher.value().is_undefined());
        assert_eq!(reports.borrow().len(), 1);
        assert!(reports.borrow()[0].ends_with("nope"));
        assert!(reports.borrow()[0].starts_with("getter for watcher"));
    }

    #[test]
    fn before_and_after_hooks_wrap_scheduled_runs() {
        let obj = state(&[("a", 1)]);
        let log = Rc::new(RefCell::new(Vec::new()));
        let (before_log, after_log, render_log) = (log.clone(), log.clone(), log.clone());
        let watched = obj.clone();
        let _watcher = Watcher::render(
            None,
            move || {
                render_log.borrow_mut().push("render");
                Ok(watched.get("a"))
            },
            WatchOptions::default()
                .before(move || before_log.borrow_mut().push("before"))
                .after(move || after_log.borrow_mut().push("after")),
        )
        .unwrap();

        obj.set("a", 2);
        run_until_idle();
        assert_eq!(*log.borrow(), vec!["render", "before", "render", "after"]);
    }

    #[test]
    fn deep_watcher_sees_nested_writes() {
        let nested: Object = [("x", 1)].into_iter().collect();
        let root = Object::new();
        root.set("nested", nested.clone());
        observe(&Value::from(root.clone()));

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let callback: Callback = Rc::new(move |_, _| {
            counter.set(counter.get() + 1);
            Ok(())
        });
        let _watcher = Watcher::new(
            Some(&root),
            "nested",
            Some(callback),
            WatchOptions::default().deep().sync().user(),
        )
        .unwrap();

        nested.set("x", 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn label_is_the_expression() {
        let root = state(&[("a", 1)]);
        let path = Watcher::new(Some(&root), "a", None, WatchOptions::default()).unwrap();
        let getter = Watcher::render(None, reader(&root, "a"), WatchOptions::default()).unwrap();

        let label = |watcher: &Watcher| Runtime::lookup(watcher.id()).map(|sub| sub.label().to_owned());
        assert_eq!(label(&path).as_deref(), Some("a"));
        assert_eq!(label(&getter).as_deref(), Some("<function>"));
    }
}
