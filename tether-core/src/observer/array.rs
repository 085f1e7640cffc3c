//! Array Mutation Interceptor
//!
//! The seven mutating array operations. Each performs the mutation, then,
//! if the array is instrumented, observes whatever was inserted and notifies
//! the array's own dependency exactly once.

use std::cmp::Ordering;

use smallvec::SmallVec;

use super::value::{Array, Value};

type Inserted = SmallVec<[Value; 4]>;

impl Array {
    /// Append elements. Returns the new length.
    pub fn push<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        let inserted: Inserted = items.into_iter().collect();
        let len = self.with_items_mut(|items| {
            items.extend(inserted.iter().cloned());
            items.len()
        });
        self.mutated(&inserted);
        len
    }

    /// Remove the last element.
    pub fn pop(&self) -> Value {
        let removed = self.with_items_mut(Vec::pop).unwrap_or_default();
        self.mutated(&[]);
        removed
    }

    /// Remove the first element.
    pub fn shift(&self) -> Value {
        let removed = self.with_items_mut(|items| {
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        });
        self.mutated(&[]);
        removed
    }

    /// Prepend elements. Returns the new length.
    pub fn unshift<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        let inserted: Inserted = items.into_iter().collect();
        let len = self.with_items_mut(|items| {
            items.splice(0..0, inserted.iter().cloned());
            items.len()
        });
        self.mutated(&inserted);
        len
    }

    /// Remove `delete_count` elements starting at `start` and insert `items`
    /// in their place. Both bounds are clamped to the array. Returns the
    /// removed elements.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let inserted: Inserted = items.into_iter().collect();
        let removed = self.with_items_mut(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, inserted.iter().cloned()).collect()
        });
        self.mutated(&inserted);
        removed
    }

    /// Sort by string form, `undefined` last.
    pub fn sort(&self) {
        self.sort_by(Value::default_order);
    }

    /// Sort with a comparator.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        // The comparator may read this array, so sort outside the borrow.
        let mut items = self.with_items_mut(std::mem::take);
        items.sort_by(compare);
        self.with_items_mut(|slot| *slot = items);
        self.mutated(&[]);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.with_items_mut(|items| items.reverse());
        self.mutated(&[]);
    }

    fn mutated(&self, inserted: &[Value]) {
        if let Some(observer) = self.observer() {
            observer.observe_array(inserted);
            observer.dep().notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{observe, Object};
    use crate::reactive::{WatchOptions, Watcher};
    use std::cell::Cell;
    use std::rc::Rc;

    fn numbers(values: &[i32]) -> Array {
        values.iter().map(|n| Value::from(*n)).collect()
    }

    #[test]
    fn mutators_behave_like_their_namesakes() {
        let array = numbers(&[1, 2, 3]);

        assert_eq!(array.push([Value::from(4)]), 4);
        assert_eq!(array.pop(), Value::from(4));
        assert_eq!(array.shift(), Value::from(1));
        assert_eq!(array.unshift([Value::from(0), Value::from(1)]), 4);
        assert_eq!(array.to_vec(), numbers(&[0, 1, 2, 3]).to_vec());

        let removed = array.splice(1, 2, [Value::from(9)]);
        assert_eq!(removed, numbers(&[1, 2]).to_vec());
        assert_eq!(array.to_vec(), numbers(&[0, 9, 3]).to_vec());

        array.reverse();
        assert_eq!(array.to_vec(), numbers(&[3, 9, 0]).to_vec());

        array.sort();
        assert_eq!(array.to_vec(), numbers(&[0, 3, 9]).to_vec());

        array.sort_by(|a, b| b.as_f64().partial_cmp(&a.as_f64()).unwrap_or(Ordering::Equal));
        assert_eq!(array.to_vec(), numbers(&[9, 3, 0]).to_vec());
    }

    #[test]
    fn empty_array_edges() {
        let array = Array::new();
        assert!(array.pop().is_undefined());
        assert!(array.shift().is_undefined());
        assert!(array.splice(5, 5, []).is_empty());
    }

    #[test]
    fn inserted_elements_are_observed() {
        let array = Array::new();
        observe(&Value::from(array.clone()));

        let pushed = Object::new();
        pushed.set("x", 1);
        let spliced = Object::new();
        array.push([Value::from(pushed.clone())]);
        array.splice(0, 0, [Value::from(spliced.clone())]);

        assert!(pushed.observer().is_some());
        assert!(pushed.property_dep("x").is_some());
        assert!(spliced.observer().is_some());
    }

    #[test]
    fn every_mutator_notifies_once_on_observed_arrays() {
        let array = numbers(&[3, 1, 2]);
        let holder = Object::new();
        holder.set("list", array.clone());
        observe(&Value::from(holder.clone()));

        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let _watcher = Watcher::render(
            None,
            move || {
                counter.set(counter.get() + 1);
                Ok(holder.get("list"))
            },
            WatchOptions::default().sync(),
        )
        .unwrap();
        assert_eq!(runs.get(), 1);

        // None of these insert anything, yet each still notifies.
        array.pop();
        assert_eq!(runs.get(), 2);
        array.shift();
        assert_eq!(runs.get(), 3);
        array.unshift([Value::from(5), Value::from(4)]);
        assert_eq!(runs.get(), 4);
        array.sort();
        assert_eq!(runs.get(), 5);
        array.reverse();
        assert_eq!(runs.get(), 6);
        array.splice(0, 1, []);
        assert_eq!(runs.get(), 7);
        assert_eq!(array.to_vec(), numbers(&[4, 1]).to_vec());
    }

    #[test]
    fn plain_arrays_stay_plain() {
        let array = Array::new();
        let item = Object::new();
        array.push([Value::from(item.clone())]);
        assert!(item.observer().is_none());
    }
}
