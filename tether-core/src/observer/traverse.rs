//! Deep Traversal
//!
//! Reads every value reachable from a root so that the subscriber currently
//! evaluating depends on all of it, not just the top reference. Used for
//! deep watchers.

use std::collections::HashSet;

use super::value::Value;
use crate::reactive::DepId;

#[derive(Default)]
struct Seen {
    deps: HashSet<DepId>,
    plain: HashSet<usize>,
}

/// Recursively read `value`, registering every nested slot.
///
/// Frozen containers are skipped. Each container is visited once, keyed by
/// its observer's dependency id (or its address when it is not observed), so
/// cyclic structures terminate.
pub fn traverse(value: &Value) {
    visit(value, &mut Seen::default());
}

fn visit(value: &Value, seen: &mut Seen) {
    if !value.is_container() || value.is_frozen() {
        return;
    }

    match value.observer() {
        Some(observer) => {
            if !seen.deps.insert(observer.dep().id()) {
                return;
            }
            observer.dep().depend();
        }
        None => {
            let addr = match value {
                Value::Object(o) => o.addr(),
                Value::Array(a) => a.addr(),
                _ => return,
            };
            if !seen.plain.insert(addr) {
                return;
            }
        }
    }

    match value {
        Value::Array(array) => {
            for item in array.to_vec().iter().rev() {
                visit(item, seen);
            }
        }
        Value::Object(object) => {
            for key in object.keys().iter().rev() {
                visit(&object.get(key), seen);
            }
        }
        _ => {}
    }
}
