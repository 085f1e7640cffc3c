//! Value Model
//!
//! Rust has no property traps, so reactive state is modelled explicitly:
//! [`Value`] is a dynamically typed value and [`Object`] / [`Array`] are
//! shared handles to containers. Reading a property goes through
//! [`Object::get`], which is where dependency registration happens once the
//! property has been instrumented.
//!
//! Containers are reference types: cloning an `Object` clones the handle,
//! and change detection compares containers by identity.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::define::ReactiveProperty;
use super::Observer;
use crate::reactive::{untrack, DepId};

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Object),
    Array(Array),
}

impl Value {
    /// Change-detection equality: primitives by value with `NaN` equal to
    /// itself, containers by identity.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for objects and arrays.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The observer attached to this value, if it is an instrumented container.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(o) => o.observer(),
            Value::Array(a) => a.observer(),
            _ => None,
        }
    }

    /// Whether the container is frozen. Primitives count as frozen.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Object(o) => o.is_frozen(),
            Value::Array(a) => a.is_frozen(),
            _ => true,
        }
    }

    /// Build a plain (uninstrumented) value from JSON.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from(items.into_iter().map(Value::from_json).collect::<Vec<_>>()))
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Snapshot the value as JSON without registering dependencies.
    ///
    /// `undefined` becomes `null`, as do non-finite numbers and references
    /// back into a container that is still being serialized.
    pub fn to_json(&self) -> serde_json::Value {
        untrack(|| self.to_json_inner(&mut HashSet::new()))
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(a) => {
                if !path.insert(a.addr()) {
                    return serde_json::Value::Null;
                }
                let items = a.to_vec().iter().map(|item| item.to_json_inner(path)).collect();
                path.remove(&a.addr());
                serde_json::Value::Array(items)
            }
            Value::Object(o) => {
                if !path.insert(o.addr()) {
                    return serde_json::Value::Null;
                }
                let map = o
                    .keys()
                    .into_iter()
                    .map(|key| {
                        let value = o.get(&key).to_json_inner(path);
                        (key, value)
                    })
                    .collect();
                path.remove(&o.addr());
                serde_json::Value::Object(map)
            }
        }
    }

    /// String form used by the default array sort.
    pub(crate) fn sort_key(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(_) => "[object Object]".to_owned(),
            Value::Array(a) => a
                .to_vec()
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.sort_key(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Ordering of the default array sort: `undefined` last, everything else
    /// by string form.
    pub(crate) fn default_order(a: &Value, b: &Value) -> Ordering {
        match (a.is_undefined(), b.is_undefined()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.sort_key().cmp(&b.sort_key()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Array(a) => fmt::Debug::fmt(a, f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from(items))
    }
}

/// A property key: a name, or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    /// The key as an array index.
    ///
    /// A name counts when it reads as a finite, non-negative whole number, so
    /// `"03"` and `"1.0"` are indices 3 and 1.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(name) => {
                let n = name.trim().parse::<f64>().ok()?;
                (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
            }
        }
    }

    /// The key as a property name.
    pub fn name(&self) -> String {
        match self {
            Key::Index(i) => i.to_string(),
            Key::Name(name) => name.clone(),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

// ----------------------------------------------------------------------------
// Objects
// ----------------------------------------------------------------------------

/// A user-supplied accessor pair.
#[derive(Clone)]
pub struct Accessor {
    pub get: Rc<dyn Fn() -> Value>,
    pub set: Option<Rc<dyn Fn(Value)>>,
}

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor(Accessor),
    Reactive(Rc<ReactiveProperty>),
}

struct Property {
    slot: Slot,
    configurable: bool,
    enumerable: bool,
}

/// Flags for [`Object::define_property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFlags {
    pub configurable: bool,
    pub enumerable: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            configurable: true,
            enumerable: true,
        }
    }
}

pub(crate) struct ObjectData {
    props: IndexMap<String, Property>,
    observer: Option<Rc<Observer>>,
    frozen: bool,
    extensible: bool,
    instance: bool,
}

/// A shared handle to an object with insertion-ordered properties.
#[derive(Clone)]
pub struct Object {
    inner: Rc<RefCell<ObjectData>>,
}

impl Object {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObjectData {
                props: IndexMap::new(),
                observer: None,
                frozen: false,
                extensible: true,
                instance: false,
            })),
        }
    }

    /// Clone the slot out so no borrow is held while user code runs.
    pub(crate) fn slot(&self, key: &str) -> Option<Slot> {
        self.inner.borrow().props.get(key).map(|p| p.slot.clone())
    }

    /// The slot and its `configurable` flag.
    pub(crate) fn descriptor(&self, key: &str) -> Option<(bool, Slot)> {
        self.inner
            .borrow()
            .props
            .get(key)
            .map(|p| (p.configurable, p.slot.clone()))
    }

    /// Read a property. Reading an instrumented property registers a
    /// dependency with the subscriber currently evaluating.
    pub fn get(&self, key: &str) -> Value {
        match self.slot(key) {
            None => Value::Undefined,
            Some(Slot::Data(value)) => value,
            Some(Slot::Accessor(accessor)) => (accessor.get)(),
            Some(Slot::Reactive(prop)) => prop.get(),
        }
    }

    /// Read a property without registering a dependency.
    pub fn peek(&self, key: &str) -> Value {
        untrack(|| self.get(key))
    }

    /// Assign a property.
    ///
    /// Goes through the reactive setter when the property is instrumented.
    /// Assigning a key the object does not have adds a plain property, which
    /// is not reactive; use [`crate::observer::set`] to add a reactive one.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.slot(key) {
            Some(Slot::Reactive(prop)) => prop.set(value),
            Some(Slot::Accessor(accessor)) => {
                if let Some(set) = accessor.set {
                    set(value);
                }
            }
            Some(Slot::Data(_)) => {
                let mut data = self.inner.borrow_mut();
                if !data.frozen {
                    if let Some(prop) = data.props.get_mut(key) {
                        prop.slot = Slot::Data(value);
                    }
                }
            }
            None => {
                let mut data = self.inner.borrow_mut();
                if data.extensible && !data.frozen {
                    data.props.insert(
                        key.to_owned(),
                        Property {
                            slot: Slot::Data(value),
                            configurable: true,
                            enumerable: true,
                        },
                    );
                }
            }
        }
    }

    /// Define (or redefine) a plain data property with explicit flags.
    pub fn define_property(&self, key: &str, value: impl Into<Value>, flags: PropertyFlags) {
        self.put(
            key,
            Property {
                slot: Slot::Data(value.into()),
                configurable: flags.configurable,
                enumerable: flags.enumerable,
            },
        );
    }

    /// Define a property backed by a user getter and optional setter.
    pub fn define_accessor<G>(&self, key: &str, get: G, set: Option<Rc<dyn Fn(Value)>>)
    where
        G: Fn() -> Value + 'static,
    {
        self.put(
            key,
            Property {
                slot: Slot::Accessor(Accessor {
                    get: Rc::new(get),
                    set,
                }),
                configurable: true,
                enumerable: true,
            },
        );
    }

    pub(crate) fn install(&self, key: &str, prop: Rc<ReactiveProperty>) {
        self.put(
            key,
            Property {
                slot: Slot::Reactive(prop),
                configurable: true,
                enumerable: true,
            },
        );
    }

    fn put(&self, key: &str, prop: Property) {
        let mut data = self.inner.borrow_mut();
        let allowed = match data.props.get(key) {
            Some(existing) => existing.configurable,
            None => data.extensible && !data.frozen,
        };
        if allowed {
            data.props.insert(key.to_owned(), prop);
        }
    }

    /// Remove a property. Returns false if it is missing or non-configurable.
    pub(crate) fn remove(&self, key: &str) -> bool {
        let mut data = self.inner.borrow_mut();
        let removable = !data.frozen && data.props.get(key).is_some_and(|p| p.configurable);
        if removable {
            data.props.shift_remove(key);
        }
        removable
    }

    /// Whether the object has its own property `key`.
    pub fn has(&self, key: &str) -> bool {
        self.inner.borrow().props.contains_key(key)
    }

    /// Enumerable keys, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .borrow()
            .props
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dependency behind an instrumented property.
    pub fn property_dep(&self, key: &str) -> Option<DepId> {
        match self.slot(key) {
            Some(Slot::Reactive(prop)) => Some(prop.dep().id()),
            _ => None,
        }
    }

    /// Freeze the object: no new keys, no plain writes, never observed.
    pub fn freeze(&self) {
        let mut data = self.inner.borrow_mut();
        data.frozen = true;
        data.extensible = false;
        for prop in data.props.values_mut() {
            prop.configurable = false;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().frozen
    }

    pub fn prevent_extensions(&self) {
        self.inner.borrow_mut().extensible = false;
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.borrow().extensible
    }

    /// Flag this object as a framework instance object, which is never
    /// observed and rejects `set`/`del`.
    pub fn mark_instance(&self) {
        self.inner.borrow_mut().instance = true;
    }

    pub fn is_instance(&self) -> bool {
        self.inner.borrow().instance
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.borrow().observer.clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        self.inner.borrow_mut().observer = Some(observer);
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<ObjectData>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<ObjectData>>) -> Self {
        Self { inner }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        for (key, value) in iter {
            let key: String = key.into();
            object.set(&key, value);
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Arrays
// ----------------------------------------------------------------------------

pub(crate) struct ArrayData {
    items: Vec<Value>,
    observer: Option<Rc<Observer>>,
    frozen: bool,
}

/// A shared handle to an array.
///
/// Element reads are not tracked on their own; a subscriber that reads the
/// array through an instrumented property depends on the array as a whole.
/// Mutation goes through the interceptor methods (`push`, `splice`, ...).
#[derive(Clone)]
pub struct Array {
    inner: Rc<RefCell<ArrayData>>,
}

impl Array {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, or `undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.inner
            .borrow()
            .items
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    pub(crate) fn with_items_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.inner.borrow_mut().items)
    }

    /// Freeze the array so it is never observed or traversed.
    pub fn freeze(&self) {
        self.inner.borrow_mut().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().frozen
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.borrow().observer.clone()
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        self.inner.borrow_mut().observer = Some(observer);
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<ArrayData>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<ArrayData>>) -> Self {
        Self { inner }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ArrayData {
                items,
                observer: None,
                frozen: false,
            })),
        }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}

/// Non-owning back-reference from an observer to its container.
pub(crate) enum WeakContainer {
    Object(Weak<RefCell<ObjectData>>),
    Array(Weak<RefCell<ArrayData>>),
}

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<Value> {
        match self {
            WeakContainer::Object(weak) => weak.upgrade().map(|rc| Value::Object(Object::from_inner(rc))),
            WeakContainer::Array(weak) => weak.upgrade().map(|rc| Value::Array(Array::from_inner(rc))),
        }
    }
}
