//! Per-instance context handed to logic hooks.

use crate::action::Action;
use crate::cancel::CancelSignal;
use crate::dependencies::Dependencies;
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

/// Everything a hook can see about the action it is handling.
///
/// The context is created once per matched action. Clones share the same
/// scratch map, so values stored by the intercept hook are visible to the
/// process hook of the same instance.
#[derive(Clone, Debug)]
pub struct LogicContext {
    action: Action,
    name: Arc<str>,
    dependencies: Dependencies,
    cancelled: CancelSignal,
    scratch: Arc<Mutex<Map<String, Value>>>,
}

impl LogicContext {
    /// Create a context.
    #[must_use]
    pub fn new(
        action: Action,
        name: Arc<str>,
        dependencies: Dependencies,
        cancelled: CancelSignal,
    ) -> Self {
        Self {
            action,
            name,
            dependencies,
            cancelled,
            scratch: Arc::new(Mutex::new(Map::new())),
        }
    }

    /// The matched action.
    #[must_use]
    pub const fn action(&self) -> &Action {
        &self.action
    }

    /// Name of the logic handling the action.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared dependencies.
    #[must_use]
    pub const fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Typed dependency lookup.
    #[must_use]
    pub fn dependency<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.dependencies.get(key)
    }

    /// The instance's cancellation signal.
    #[must_use]
    pub const fn cancel_signal(&self) -> &CancelSignal {
        &self.cancelled
    }

    /// Whether the instance was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Store a value in the instance scratch map.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Read a value from the instance scratch map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> LogicContext {
        LogicContext::new(
            Action::new("LOAD"),
            Arc::from("L(LOAD)-0"),
            Dependencies::new().with("retries", 3_u32),
            CancelSignal::never(),
        )
    }

    #[test]
    fn exposes_action_and_name() {
        let ctx = context();
        assert_eq!(ctx.action().action_type(), "LOAD");
        assert_eq!(ctx.name(), "L(LOAD)-0");
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn scratch_is_shared_between_clones() {
        let ctx = context();
        let clone = ctx.clone();
        ctx.set("started", true);
        assert_eq!(clone.get("started"), Some(json!(true)));
        assert_eq!(clone.get("missing"), None);
    }

    #[test]
    fn typed_dependency_lookup() {
        assert_eq!(context().dependency::<u32>("retries").as_deref(), Some(&3));
    }
}
