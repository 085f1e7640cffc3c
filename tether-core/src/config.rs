//! Engine Configuration
//!
//! Configuration is kept per thread. The engine is single-threaded: every
//! value, dependency and watcher lives on the thread that created it, so the
//! configuration that governs them lives there too.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EvalError;
use crate::observer::Object;
use crate::reactive::untrack;

/// Default ceiling on how many times one watcher may run within a single flush.
pub const MAX_UPDATE_COUNT: u32 = 100;

/// Signature of the external error handler.
///
/// Receives the error, the owner object of the failing watcher (if any) and a
/// short description of where the error happened.
pub type ErrorHandler = Rc<dyn Fn(&EvalError, Option<&Object>, &str)>;

/// Tunable engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// When false, queued watchers are flushed synchronously at queue time
    /// instead of on the next tick.
    pub async_mode: bool,

    /// How many times a watcher may re-queue itself within one flush before
    /// it is treated as an infinite update loop.
    pub max_update_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_mode: true,
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
}

/// Read the current configuration.
pub fn with<R>(f: impl FnOnce(&Config) -> R) -> R {
    CONFIG.with(|config| f(&config.borrow()))
}

/// Modify the current configuration.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|config| f(&mut config.borrow_mut()));
}

/// Install the handler that receives errors from user computations.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&EvalError, Option<&Object>, &str) + 'static,
{
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Remove the installed error handler, falling back to logging.
pub fn clear_error_handler() {
    ERROR_HANDLER.with(|slot| slot.borrow_mut().take());
}

/// Report an error raised inside the engine's evaluation boundary.
///
/// The handler runs untracked, so whatever it reads does not become a
/// dependency of the failing watcher.
pub fn handle_error(error: &EvalError, owner: Option<&Object>, info: &str) {
    // Clone out so the handler may itself install another handler.
    let handler = ERROR_HANDLER.with(|slot| slot.borrow().clone());
    match handler {
        Some(handler) => untrack(|| handler(error, owner, info)),
        None => tracing::error!(%error, info, "unhandled error during evaluation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn defaults() {
        with(|config| {
            assert!(config.async_mode);
            assert_eq!(config.max_update_count, MAX_UPDATE_COUNT);
        });
    }

    #[test]
    fn update_changes_config() {
        update(|config| config.max_update_count = 3);
        assert_eq!(with(|config| config.max_update_count), 3);
        update(|config| *config = Config::default());
    }

    #[test]
    fn handler_receives_errors() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        set_error_handler(move |err, owner, info| {
            sink.borrow_mut().push((err.to_string(), owner.is_some(), info.to_owned()));
        });

        handle_error(&EvalError::msg("boom"), None, "callback for watcher \"a\"");
        clear_error_handler();
        // Logged only, not recorded.
        handle_error(&EvalError::msg("ignored"), None, "x");

        assert_eq!(
            *seen.borrow(),
            vec![("boom".to_owned(), false, "callback for watcher \"a\"".to_owned())]
        );
    }
}
