//! Error taxonomy.
//!
//! - [`ConfigError`]: fatal, returned synchronously from registration and
//!   from the entry point when the middleware is not attached.
//! - [`LogicError`]: recoverable failures produced by process hooks. They
//!   travel through the dispatch queue and are turned into error actions.

use crate::action::{Action, NotAnAction};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while configuring or registering logic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The same logic instance was registered twice.
    #[error("duplicate logic registered: {name}")]
    DuplicateLogic {
        /// Name of the duplicated logic
        name: String,
    },

    /// A dependency key was injected with a different value.
    #[error("dependency '{key}' is already injected with a different value")]
    DependencyConflict {
        /// The conflicting key
        key: String,
    },

    /// The entry point was used before a consumer was attached.
    #[error("no downstream consumer attached; call attach() before dispatching")]
    MissingConsumer,

    /// `attach` was called twice.
    #[error("a downstream consumer is already attached")]
    AlreadyAttached,
}

/// Failure produced while processing an action.
#[derive(Error, Debug)]
pub enum LogicError {
    /// Plain error message.
    #[error("{0}")]
    Message(String),

    /// An error that already is an action; it is dispatched as-is.
    #[error("error action {0}")]
    Action(Action),

    /// A success value was not an action and no `success_type` mapped it.
    #[error(transparent)]
    NotAnAction(#[from] NotAnAction),

    /// The process hook panicked.
    #[error("process hook panicked: {0}")]
    Panicked(String),

    /// Any other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LogicError {
    /// Create a message error.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Payload describing this error inside an error action.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match self {
            Self::Action(action) => Value::from(action.clone()),
            Self::NotAnAction(NotAnAction(value)) => value.clone(),
            other => Value::String(other.to_string()),
        }
    }

    /// The carried action, when the error already has a type.
    #[must_use]
    pub fn typed_action(&self) -> Option<&Action> {
        match self {
            Self::Action(action) => Some(action),
            _ => None,
        }
    }
}

impl From<Action> for LogicError {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

impl From<String> for LogicError {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for LogicError {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}
