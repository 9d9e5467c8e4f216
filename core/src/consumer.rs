//! The downstream consumer contract.
//!
//! Whatever receives actions after the middleware (a store, a reducer loop,
//! a test recorder) implements [`Consumer`]. The middleware never lets a
//! consumer failure escape: errors are logged and reported as `nextError`
//! monitor events.

use crate::action::Action;
use thiserror::Error;

/// Failure reported by a downstream consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("consumer rejected {action_type}: {reason}")]
pub struct ConsumerError {
    /// Type of the action that failed.
    pub action_type: String,
    /// Why it failed.
    pub reason: String,
}

impl ConsumerError {
    /// Create an error for `action`.
    #[must_use]
    pub fn new(action: &Action, reason: impl Into<String>) -> Self {
        Self {
            action_type: action.action_type.clone(),
            reason: reason.into(),
        }
    }
}

/// Receives actions that made it through the pipeline.
pub trait Consumer: Send + Sync {
    /// Accept an action, returning it (or the consumer's result) back.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] when the action cannot be handled. The
    /// middleware absorbs the error.
    fn dispatch(&self, action: Action) -> Result<Action, ConsumerError>;
}

impl<F> Consumer for F
where
    F: Fn(Action) -> Result<Action, ConsumerError> + Send + Sync,
{
    fn dispatch(&self, action: Action) -> Result<Action, ConsumerError> {
        self(action)
    }
}
