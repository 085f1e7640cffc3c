//! Dependency
//!
//! A `Dep` is the observable channel behind one reactive slot: a property,
//! or a container's own identity. Reading the slot calls [`Dep::depend`];
//! changing it calls [`Dep::notify`].

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::DepId;

/// An observable channel with a set of interested subscribers.
///
/// The subscriber set lives in the runtime arena. Dropping the `Dep`
/// removes its record.
#[derive(Debug)]
pub struct Dep {
    id: DepId,
}

impl Dep {
    pub fn new() -> Self {
        Self { id: DepId::new() }
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Register this dependency with the subscriber currently evaluating.
    pub fn depend(&self) {
        depend_on(self.id);
    }

    /// Notify every subscriber.
    pub fn notify(&self) {
        Runtime::notify(self.id);
    }

    /// Number of subscribers currently interested in this dependency.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscribers(self.id).len()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        Runtime::remove_dep(self.id);
    }
}

/// Register a dependency, by id, with the subscriber currently evaluating.
pub(crate) fn depend_on(id: DepId) {
    if let Some(subscriber) = ReactiveContext::current() {
        subscriber.add_dep(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depend_without_subscriber_is_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn ids_increase() {
        let a = Dep::new();
        let b = Dep::new();
        assert!(a.id() < b.id());
    }
}
