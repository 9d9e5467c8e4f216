//! Actions flowing through the middleware.
//!
//! An [`Action`] is a flux-standard-action shaped value: a `type` string plus
//! optional `payload`, `error` flag and `meta`. The middleware only ever
//! inspects [`Action::action_type`]; everything else is carried through
//! untouched for the downstream consumer.
//!
//! # Examples
//!
//! ```
//! use composable_logic_core::action::Action;
//! use serde_json::json;
//!
//! let action = Action::new("FETCH_USER").with_payload(json!({ "id": 7 }));
//! assert_eq!(action.action_type(), "FETCH_USER");
//!
//! let value = serde_json::Value::from(action.clone());
//! assert_eq!(value["type"], "FETCH_USER");
//! assert_eq!(Action::try_from(value).ok(), Some(action));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Type used for the generic error action emitted when a process hook fails
/// and no `fail_type` was configured.
pub const UNHANDLED_LOGIC_ERROR: &str = "UNHANDLED_LOGIC_ERROR";

/// A discrete unit of work dispatched through the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The action type, serialized as `"type"`.
    #[serde(rename = "type")]
    pub action_type: String,

    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Whether this action reports an error.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Action {
    /// Create an action with the given type and no payload.
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: None,
            error: false,
            meta: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set the error flag.
    #[must_use]
    pub const fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// The action type.
    #[must_use]
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// Whether the two actions share a type.
    #[must_use]
    pub fn same_type(&self, other: &Self) -> bool {
        self.action_type == other.action_type
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action_type)
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::String(action.action_type));
        if let Some(payload) = action.payload {
            map.insert("payload".to_string(), payload);
        }
        if action.error {
            map.insert("error".to_string(), Value::Bool(true));
        }
        if let Some(meta) = action.meta {
            map.insert("meta".to_string(), meta);
        }
        Self::Object(map)
    }
}

/// Error returned when a JSON value does not describe an action.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("value is not an action: {0}")]
pub struct NotAnAction(pub Value);

impl TryFrom<Value> for Action {
    type Error = NotAnAction;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let is_action = value
            .get("type")
            .is_some_and(Value::is_string);
        if !is_action {
            return Err(NotAnAction(value));
        }
        serde_json::from_value(value.clone()).map_err(|_| NotAnAction(value))
    }
}
