//! Error types.
//!
//! Getters and callbacks handed to the engine return `Result<_, EvalError>`.
//! Errors from user watchers never escape: they are routed to the configured
//! error handler (see [`crate::config::handle_error`]). Errors from internal
//! watchers (render, computed) propagate to whoever evaluated them directly.

use std::fmt;
use std::rc::Rc;

/// An error raised by a watcher's target computation or callback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    /// A plain message.
    #[error("{0}")]
    Message(String),

    /// Any other error, kept behind an `Rc` so the error stays cloneable.
    #[error("{0}")]
    Source(Rc<dyn std::error::Error>),
}

impl EvalError {
    /// Create an error from a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::Message(message.to_string())
    }

    /// Wrap an arbitrary error.
    pub fn wrap<E>(error: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Source(Rc::new(error))
    }
}

impl From<String> for EvalError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for EvalError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_owned())
    }
}

impl PartialEq for EvalError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_displays_verbatim() {
        let err = EvalError::msg("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err, EvalError::from("boom"));
    }

    #[test]
    fn wrapped_error_keeps_message() {
        let parse = "x".parse::<i32>().unwrap_err();
        let expected = parse.to_string();
        let err = EvalError::wrap(parse);
        assert_eq!(err.to_string(), expected);
    }
}
