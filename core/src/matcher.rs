//! Action type matching.
//!
//! A [`TypeMatcher`] decides whether an action type belongs to a logic. It is
//! used both for the logic's own `type` and for its `cancel_type`.

use regex::Regex;
use std::fmt;

/// The wildcard pattern matching every action type.
pub const WILDCARD: &str = "*";

/// Pattern describing a set of action types.
#[derive(Clone)]
pub enum TypeMatcher {
    /// Matches every action type, including types unseen at registration.
    Any,

    /// Matches exactly one action type.
    Exact(String),

    /// Matches action types accepted by the regular expression.
    Pattern(Regex),

    /// Matches when any member matches.
    OneOf(Vec<TypeMatcher>),
}

impl TypeMatcher {
    /// Build a matcher from a regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if the expression does not compile.
    pub fn pattern(expr: &str) -> Result<Self, regex::Error> {
        Regex::new(expr).map(Self::Pattern)
    }

    /// Build a matcher accepting any of the given patterns.
    #[must_use]
    pub fn one_of<I, M>(matchers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Self>,
    {
        Self::OneOf(matchers.into_iter().map(Into::into).collect())
    }

    /// Whether `action_type` satisfies this pattern.
    #[must_use]
    pub fn matches(&self, action_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == action_type,
            Self::Pattern(regex) => regex.is_match(action_type),
            Self::OneOf(members) => members.iter().any(|m| m.matches(action_type)),
        }
    }

    /// Short label used when deriving a default logic name.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Any => WILDCARD.to_string(),
            Self::Exact(action_type) => action_type.clone(),
            Self::Pattern(regex) => format!("/{}/", regex.as_str()),
            Self::OneOf(members) => members
                .iter()
                .map(Self::label)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Flatten into a list of alternatives.
    #[must_use]
    pub fn into_alternatives(self) -> Vec<Self> {
        match self {
            Self::OneOf(members) => members
                .into_iter()
                .flat_map(Self::into_alternatives)
                .collect(),
            other => vec![other],
        }
    }
}

/// Evaluate an optional pattern. No pattern never matches.
#[must_use]
pub fn matches(pattern: Option<&TypeMatcher>, action_type: &str) -> bool {
    pattern.is_some_and(|p| p.matches(action_type))
}

impl From<&str> for TypeMatcher {
    fn from(value: &str) -> Self {
        if value == WILDCARD {
            Self::Any
        } else {
            Self::Exact(value.to_string())
        }
    }
}

impl From<String> for TypeMatcher {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Regex> for TypeMatcher {
    fn from(value: Regex) -> Self {
        Self::Pattern(value)
    }
}

impl<M: Into<Self>> From<Vec<M>> for TypeMatcher {
    fn from(value: Vec<M>) -> Self {
        Self::one_of(value)
    }
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "TypeMatcher::Any"),
            Self::Exact(t) => f.debug_tuple("TypeMatcher::Exact").field(t).finish(),
            Self::Pattern(r) => f
                .debug_tuple("TypeMatcher::Pattern")
                .field(&r.as_str())
                .finish(),
            Self::OneOf(m) => f.debug_tuple("TypeMatcher::OneOf").field(m).finish(),
        }
    }
}

impl fmt::Display for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exact_matches_only_identical_type() {
        let m = TypeMatcher::from("FETCH");
        assert!(m.matches("FETCH"));
        assert!(!m.matches("FETCH_OK"));
        assert!(!m.matches("fetch"));
    }

    #[test]
    fn star_becomes_wildcard() {
        assert!(matches!(TypeMatcher::from("*"), TypeMatcher::Any));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn pattern_uses_regex_semantics() {
        let m = TypeMatcher::pattern("^USER_").unwrap();
        assert!(m.matches("USER_LOAD"));
        assert!(!m.matches("LOAD_USER"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn one_of_matches_any_member() {
        let m = TypeMatcher::one_of(vec![
            TypeMatcher::from("A"),
            TypeMatcher::pattern("^B").unwrap(),
        ]);
        assert!(m.matches("A"));
        assert!(m.matches("BEE"));
        assert!(!m.matches("C"));
    }

    #[test]
    fn missing_pattern_never_matches() {
        assert!(!matches(None, "ANYTHING"));
        assert!(matches(Some(&TypeMatcher::Any), "ANYTHING"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn labels_describe_patterns() {
        assert_eq!(TypeMatcher::Any.label(), "*");
        assert_eq!(TypeMatcher::pattern("^X").unwrap().label(), "/^X/");
        assert_eq!(TypeMatcher::from(vec!["A", "B"]).label(), "A,B");
    }

    #[test]
    fn alternatives_are_flattened() {
        let nested = TypeMatcher::one_of(vec![
            TypeMatcher::from("A"),
            TypeMatcher::from(vec!["B", "C"]),
        ]);
        assert_eq!(nested.into_alternatives().len(), 3);
    }

    proptest! {
        #[test]
        fn wildcard_matches_every_type(action_type in ".*") {
            prop_assert!(TypeMatcher::from(WILDCARD).matches(&action_type));
        }

        #[test]
        fn empty_one_of_matches_nothing(action_type in ".*") {
            prop_assert!(!TypeMatcher::OneOf(Vec::new()).matches(&action_type));
        }
    }
}
