//! Shared dependencies injected into every logic hook.
//!
//! Dependencies are read-mostly: hooks receive a snapshot through their
//! [`LogicContext`](crate::context::LogicContext) and the only write path is
//! [`Dependencies::inject`]. Values are compared by identity, so injecting the
//! same `Arc` twice is allowed while injecting a different value under an
//! existing key is rejected.

use crate::error::ConfigError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A type-erased dependency.
pub type Dependency = Arc<dyn Any + Send + Sync>;

/// String-keyed dependency map.
#[derive(Clone, Default)]
pub struct Dependencies {
    entries: HashMap<String, Dependency>,
}

impl Dependencies {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert used when assembling the initial map.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.entries.insert(key.into(), Arc::new(value));
        self
    }

    /// Builder-style insert of an already shared value.
    #[must_use]
    pub fn with_shared(mut self, key: impl Into<String>, value: Dependency) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Typed lookup.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .get(key)
            .and_then(|dep| Arc::clone(dep).downcast::<T>().ok())
    }

    /// Untyped lookup.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<&Dependency> {
        self.entries.get(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Merge `other` into this map.
    ///
    /// Validation happens before any key is written, so a conflict leaves the
    /// map unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DependencyConflict`] when a key already holds a
    /// different value.
    pub fn inject(&mut self, other: &Self) -> Result<(), ConfigError> {
        for (key, value) in &other.entries {
            if let Some(existing) = self.entries.get(key) {
                if !Arc::ptr_eq(existing, value) {
                    return Err(ConfigError::DependencyConflict { key: key.clone() });
                }
            }
        }
        for (key, value) in &other.entries {
            self.entries
                .entry(key.clone())
                .or_insert_with(|| Arc::clone(value));
        }
        Ok(())
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Dependencies").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ApiClient {
        base_url: &'static str,
    }

    #[test]
    fn typed_lookup_downcasts() {
        let deps = Dependencies::new().with("api", ApiClient { base_url: "http://x" });
        let api = deps.get::<ApiClient>("api");
        assert_eq!(api.map(|a| a.base_url), Some("http://x"));
        assert!(deps.get::<String>("api").is_none());
        assert!(deps.get::<ApiClient>("missing").is_none());
    }

    #[test]
    fn reinjecting_the_same_value_is_idempotent() {
        let shared: Dependency = Arc::new(5_u32);
        let mut deps = Dependencies::new().with_shared("n", Arc::clone(&shared));
        let again = Dependencies::new().with_shared("n", shared);
        assert!(deps.inject(&again).is_ok());
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn injecting_a_different_value_conflicts() {
        let mut deps = Dependencies::new().with("n", 5_u32).with("a", 1_u8);
        let other = Dependencies::new().with("b", 2_u8).with("n", 5_u32);
        assert_eq!(
            deps.inject(&other),
            Err(ConfigError::DependencyConflict { key: "n".to_string() })
        );
        assert!(!deps.contains("b"));
    }

    #[test]
    fn injecting_new_keys_extends_the_map() {
        let mut deps = Dependencies::new().with("a", 1_u8);
        assert!(deps.inject(&Dependencies::new().with("b", 2_u8)).is_ok());
        assert!(deps.contains("a"));
        assert!(deps.contains("b"));
    }
}
