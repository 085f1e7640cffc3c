//! Observer
//!
//! This module turns plain data into reactive data. [`observe`] attaches an
//! [`Observer`] to an object or array: every enumerable property of an object
//! gets an intercepted slot (see [`define_reactive`]), arrays get their
//! mutating methods routed through the interceptor, and the whole thing
//! recurses into nested containers.
//!
//! # Concepts
//!
//! ## Property dependencies
//!
//! Each instrumented property has its own [`Dep`]. Reading it registers the
//! evaluating subscriber; assigning a different value notifies.
//!
//! ## Container dependencies
//!
//! Each observer has one more [`Dep`] standing for the container itself.
//! It fires when an array is mutated in place and when [`set`] / [`del`] add
//! or remove a property. Reading a property whose value is a container also
//! registers with that container's dependency, so mutating the container is
//! visible to anyone who read the reference.

mod array;
mod define;
mod traverse;
mod value;

use std::cell::Cell;
use std::rc::Rc;

pub use define::{define_reactive, CustomSetter, ReactiveProperty};
pub use traverse::traverse;
pub use value::{Accessor, Array, Key, Object, PropertyFlags, Value};

use value::WeakContainer;

use crate::reactive::Dep;

/// The largest index [`set`] will grow an array to.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Turn observation on or off for the current thread.
///
/// Used transiently while constructing values that will be replaced right
/// away, so they are not instrumented for nothing.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

/// Whether [`observe`] currently creates new observers.
pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// The per-container instrumentation record.
pub struct Observer {
    value: WeakContainer,
    dep: Dep,
    root_count: Cell<u32>,
}

impl Observer {
    fn attach(value: &Value) -> Option<Rc<Self>> {
        let container = match value {
            Value::Object(o) => WeakContainer::Object(o.downgrade()),
            Value::Array(a) => WeakContainer::Array(a.downgrade()),
            _ => return None,
        };
        let observer = Rc::new(Self {
            value: container,
            dep: Dep::new(),
            root_count: Cell::new(0),
        });

        // Mark before recursing so cycles find the observer already there.
        match value {
            Value::Object(o) => {
                o.attach_observer(observer.clone());
                observer.walk(o);
            }
            Value::Array(a) => {
                a.attach_observer(observer.clone());
                observer.observe_array(&a.to_vec());
            }
            _ => {}
        }

        Some(observer)
    }

    /// The dependency standing for the container itself.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// The observed container, while it is alive.
    pub fn value(&self) -> Option<Value> {
        self.value.upgrade()
    }

    /// How many owners use the container as their root state.
    pub fn root_count(&self) -> u32 {
        self.root_count.get()
    }

    fn walk(&self, object: &Object) {
        for key in object.keys() {
            define_reactive(object, &key, None, None, false);
        }
    }

    pub(crate) fn observe_array(&self, items: &[Value]) {
        for item in items {
            observe(item);
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Instrument a value.
///
/// Returns the existing observer if the value already has one, a new
/// observer for plain extensible objects and arrays, and nothing for
/// primitives, frozen or non-extensible containers, instance objects, or
/// while observation is toggled off.
pub fn observe(value: &Value) -> Option<Rc<Observer>> {
    match value {
        Value::Object(o) => {
            if let Some(observer) = o.observer() {
                return Some(observer);
            }
            if !is_observing() || o.is_instance() || o.is_frozen() || !o.is_extensible() {
                return None;
            }
            Observer::attach(value)
        }
        Value::Array(a) => {
            if let Some(observer) = a.observer() {
                return Some(observer);
            }
            if !is_observing() || a.is_frozen() {
                return None;
            }
            Observer::attach(value)
        }
        _ => None,
    }
}

/// Instrument a value that an owner uses as its root state.
///
/// Root containers reject [`set`] and [`del`]: their shape is fixed up front.
pub fn observe_root(value: &Value) -> Option<Rc<Observer>> {
    let observer = observe(value)?;
    observer.root_count.set(observer.root_count.get() + 1);
    Some(observer)
}

/// Add or overwrite a property and make it reactive.
///
/// On an array with an index key the array is extended as needed and the
/// element is replaced through `splice`. On an object, an existing property
/// is simply assigned; a new one is installed as reactive and the object's
/// own dependency is notified. Returns the value.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Array(array) => {
            let Some(index) = key.as_index() else {
                tracing::warn!(key = %key.name(), "cannot set a non-index key on an array");
                return value;
            };
            if index > MAX_ARRAY_INDEX {
                tracing::warn!(index, max = MAX_ARRAY_INDEX, "array index out of range");
                return value;
            }
            let grown = array.with_items_mut(|items| {
                if items.len() < index {
                    items.try_reserve(index - items.len())?;
                    items.resize(index, Value::Undefined);
                }
                Ok::<_, std::collections::TryReserveError>(())
            });
            if let Err(error) = grown {
                tracing::warn!(index, %error, "cannot grow array to index");
                return value;
            }
            array.splice(index, 1, [value.clone()]);
            value
        }
        Value::Object(object) => {
            let name = key.name();
            if object.has(&name) {
                object.set(&name, value.clone());
                return value;
            }
            let observer = object.observer();
            if object.is_instance() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                tracing::warn!(
                    key = %name,
                    "avoid adding reactive properties to an instance or its root data at runtime; declare it upfront"
                );
                return value;
            }
            match observer {
                None => object.set(&name, value.clone()),
                Some(observer) => {
                    define_reactive(object, &name, Some(value.clone()), None, false);
                    observer.dep().notify();
                }
            }
            value
        }
        other => {
            tracing::warn!(value = ?other, "cannot set reactive property on undefined, null, or primitive value");
            value
        }
    }
}

/// Delete a property and notify.
///
/// Array indices are removed through `splice`.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();

    match target {
        Value::Array(array) => match key.as_index() {
            Some(index) => {
                array.splice(index, 1, []);
            }
            None => tracing::warn!(key = %key.name(), "cannot delete a non-index key from an array"),
        },
        Value::Object(object) => {
            let observer = object.observer();
            if object.is_instance() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                tracing::warn!(
                    key = %key.name(),
                    "avoid deleting properties on an instance or its root data; set it to null instead"
                );
                return;
            }
            if !object.remove(&key.name()) {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        other => {
            tracing::warn!(value = ?other, "cannot delete reactive property on undefined, null, or primitive value");
        }
    }
}
