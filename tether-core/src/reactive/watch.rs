//! User Watchers
//!
//! [`create_watcher`] watches a dotted path on an owner object, or an
//! arbitrary getter, and calls back with `(new, old)` whenever the result
//! changes. Errors raised by the getter or the callback go to the configured
//! error handler.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::untrack;
use super::watcher::{Callback, Getter, WatchOptions, Watcher};
use crate::config;
use crate::error::EvalError;
use crate::observer::{Object, Value};

/// Label used for watchers whose target is a closure.
const FUNCTION_EXPRESSION: &str = "<function>";

type Segments = SmallVec<[String; 4]>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum WatchTarget {
    /// A dotted property path, resolved against the owner object.
    Path(String),
    /// An arbitrary getter.
    Getter(Getter),
}

impl WatchTarget {
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn() -> Result<Value, EvalError> + 'static,
    {
        Self::Getter(Rc::new(getter))
    }

    pub(crate) fn into_getter(self, owner: Option<&Object>) -> (Getter, String) {
        match self {
            Self::Getter(getter) => (getter, FUNCTION_EXPRESSION.to_owned()),
            Self::Path(path) => {
                let getter: Getter = match parse_path(&path) {
                    Some(segments) => {
                        let root = owner.cloned().map(Value::Object).unwrap_or_default();
                        Rc::new(move || Ok(resolve(&root, &segments)))
                    }
                    None => {
                        tracing::warn!(
                            path = %path,
                            "watcher only accepts simple dot-delimited paths; use a getter for full control"
                        );
                        Rc::new(|| Ok(Value::Undefined))
                    }
                };
                (getter, path)
            }
        }
    }
}

impl From<&str> for WatchTarget {
    fn from(path: &str) -> Self {
        Self::Path(path.to_owned())
    }
}

impl From<String> for WatchTarget {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Getter(_) => f.write_str("Getter"),
        }
    }
}

/// Split a dotted path into segments. Returns `None` if the path contains
/// anything but word characters, `.` and `$`.
fn parse_path(path: &str) -> Option<Segments> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$');
    valid.then(|| path.split('.').map(str::to_owned).collect())
}

fn resolve(root: &Value, segments: &[String]) -> Value {
    let mut current = root.clone();
    for segment in segments {
        if !current.is_truthy() {
            return Value::Undefined;
        }
        current = match &current {
            Value::Object(object) => object.get(segment),
            Value::Array(array) if segment == "length" => Value::from(array.len()),
            Value::Array(array) => match segment.parse::<usize>() {
                Ok(index) => array.get(index),
                Err(_) => Value::Undefined,
            },
            Value::String(s) if segment == "length" => Value::from(s.chars().count()),
            _ => Value::Undefined,
        };
    }
    current
}

/// Handle returned by [`create_watcher`]. Dropping it, or calling
/// [`Unwatch::unwatch`], stops the watcher.
#[must_use = "dropping the handle stops the watcher"]
pub struct Unwatch {
    watcher: Watcher,
}

impl Unwatch {
    /// Stop watching.
    pub fn unwatch(self) {
        self.watcher.teardown();
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Unwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unwatch").field(&self.watcher).finish()
    }
}

/// Watch `target` on `owner`, invoking `callback` with `(new, old)` after
/// each change.
///
/// The watcher is always a user watcher. With `immediate`, the callback
/// also runs once right away, untracked, with `old` set to `undefined`.
pub fn create_watcher<F>(
    owner: &Object,
    target: impl Into<WatchTarget>,
    callback: F,
    options: WatchOptions,
) -> Result<Unwatch, EvalError>
where
    F: Fn(&Value, &Value) -> Result<(), EvalError> + 'static,
{
    let callback: Callback = Rc::new(callback);
    let immediate = options.immediate;
    let watcher = Watcher::new(Some(owner), target, Some(callback.clone()), options.user())?;

    if immediate {
        let value = watcher.value();
        if let Err(error) = untrack(|| callback(&value, &Value::Undefined)) {
            let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
            config::handle_error(&error, Some(owner), &info);
        }
    }

    Ok(Unwatch { watcher })
}
