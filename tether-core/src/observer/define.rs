//! Accessor Installer
//!
//! [`define_reactive`] replaces one property of an object with an
//! intercepted slot backed by its own [`Dep`]. Reads register the evaluating
//! subscriber; writes that change the value notify.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::value::{Array, Object, Slot, Value};
use super::{observe, Observer};
use crate::reactive::{untrack, Dep, ReactiveContext};

/// Callback invoked before a reactive property is written, typically to warn
/// about a mutation the owner considers invalid.
pub type CustomSetter = Rc<dyn Fn()>;

type Getter = Rc<dyn Fn() -> Value>;
type Setter = Rc<dyn Fn(Value)>;

/// An installed reactive property.
pub struct ReactiveProperty {
    dep: Dep,
    value: RefCell<Value>,
    child: RefCell<Option<Rc<Observer>>>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
}

impl ReactiveProperty {
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub(crate) fn get(&self) -> Value {
        let value = match &self.getter {
            Some(getter) => getter(),
            None => self.value.borrow().clone(),
        };

        if ReactiveContext::is_tracking() {
            self.dep.depend();
            let child = self.child.borrow().clone();
            if let Some(child) = child {
                child.dep().depend();
                if let Value::Array(array) = &value {
                    depend_array(array, &mut HashSet::new());
                }
            }
        }

        value
    }

    pub(crate) fn set(&self, new_value: Value) {
        let current = match &self.getter {
            Some(getter) => getter(),
            None => self.value.borrow().clone(),
        };
        if new_value.same(&current) {
            return;
        }

        if let Some(custom_setter) = &self.custom_setter {
            custom_setter();
        }

        match (&self.getter, &self.setter) {
            // Read-only accessor.
            (Some(_), None) => return,
            (_, Some(setter)) => setter(new_value.clone()),
            (None, None) => *self.value.borrow_mut() = new_value.clone(),
        }

        let child = if self.shallow { None } else { observe(&new_value) };
        *self.child.borrow_mut() = child;
        self.dep.notify();
    }
}

/// Install a reactive property on `object`.
///
/// With `value` set to `None`, the property's current value is kept. A
/// pre-existing user accessor keeps working underneath: reads call its
/// getter and writes its setter. Non-configurable properties are left alone.
/// With `shallow`, the value is not observed recursively.
pub fn define_reactive(
    object: &Object,
    key: &str,
    value: Option<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    let existing = object.descriptor(key);
    if let Some((false, _)) = existing {
        return;
    }

    let (getter, setter, current): (Option<Getter>, Option<Setter>, Value) = match existing {
        Some((_, Slot::Accessor(accessor))) => (Some(accessor.get), accessor.set, Value::Undefined),
        Some((_, Slot::Reactive(previous))) => {
            let read = previous.clone();
            let getter: Getter = Rc::new(move || read.get());
            let setter: Setter = Rc::new(move |v: Value| previous.set(v));
            (Some(getter), Some(setter), Value::Undefined)
        }
        Some((_, Slot::Data(current))) => (None, None, current),
        None => (None, None, Value::Undefined),
    };

    let initial = match value {
        Some(value) => value,
        None => match (&getter, &setter) {
            (None, _) => current,
            (Some(getter), Some(_)) => untrack(|| getter()),
            (Some(_), None) => Value::Undefined,
        },
    };

    let child = if shallow { None } else { observe(&initial) };

    object.install(
        key,
        Rc::new(ReactiveProperty {
            dep: Dep::new(),
            value: RefCell::new(initial),
            child: RefCell::new(child),
            getter,
            setter,
            custom_setter,
            shallow,
        }),
    );
}

/// Register the evaluating subscriber with every instrumented element of an
/// array, recursing into nested arrays, since element reads are not
/// intercepted themselves.
fn depend_array(array: &Array, seen: &mut HashSet<usize>) {
    if !seen.insert(array.addr()) {
        return;
    }
    for item in array.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(inner) = &item {
            depend_array(inner, seen);
        }
    }
}
