//! Logic definitions.
//!
//! A [`Logic`] pairs a type matcher with an intercept hook and an optional
//! process hook, plus the concurrency options applied before any instance is
//! started. Logic is immutable once built and shared as `Arc<Logic>`; two
//! registrations are "the same logic" only when they are the same `Arc`.
//!
//! # Example
//!
//! ```
//! use composable_logic_core::action::Action;
//! use composable_logic_core::effect::Effect;
//! use composable_logic_core::logic::{DispatchMode, Logic};
//! use std::time::Duration;
//!
//! let fetch = Logic::builder("FETCH")
//!     .latest(true)
//!     .cancel_type("FETCH_CANCEL")
//!     .debounce(Duration::from_millis(50))
//!     .process(|_ctx| Effect::future(async { Ok(Some(Action::new("FETCH_OK"))) }))
//!     .build();
//!
//! assert!(fetch.matches("FETCH"));
//! assert_eq!(fetch.dispatch_mode(), DispatchMode::ReturnValue);
//! assert_eq!(fetch.default_name(0), "L(FETCH)-0");
//! ```

use crate::action::Action;
use crate::context::LogicContext;
use crate::dispatch::{Dispatch, Done};
use crate::effect::Effect;
use crate::error::LogicError;
use crate::intercept::InterceptGate;
use crate::matcher::TypeMatcher;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default warn timeout applied by the builder.
pub const DEFAULT_WARN_TIMEOUT: Duration = Duration::from_secs(60);

/// Intercept hook.
pub type InterceptFn = Arc<dyn Fn(&LogicContext, InterceptGate) + Send + Sync>;

/// Process hook whose return value is dispatched.
pub type ReturnFn = Arc<dyn Fn(LogicContext) -> Effect + Send + Sync>;

/// Process hook receiving a dispatch callback.
pub type SingleFn = Arc<dyn Fn(LogicContext, Dispatch) + Send + Sync>;

/// Process hook receiving dispatch and done callbacks.
pub type MultiFn = Arc<dyn Fn(LogicContext, Dispatch, Done) + Send + Sync>;

/// How a process hook hands results to its dispatch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// The hook's return value is dispatched, then the instance completes.
    ReturnValue,

    /// The hook calls `dispatch` once; that call completes the instance
    /// unless `allow_more` is set.
    SingleCallback,

    /// The hook calls `dispatch` any number of times and completes with `done`.
    MultiCallback,
}

/// A process hook tagged with its dispatch mode.
#[derive(Clone)]
pub enum Process {
    /// See [`DispatchMode::ReturnValue`].
    Return(ReturnFn),

    /// See [`DispatchMode::SingleCallback`].
    Single(SingleFn),

    /// See [`DispatchMode::MultiCallback`].
    Multi(MultiFn),
}

impl Process {
    /// The dispatch mode this hook runs in.
    #[must_use]
    pub const fn mode(&self) -> DispatchMode {
        match self {
            Self::Return(_) => DispatchMode::ReturnValue,
            Self::Single(_) => DispatchMode::SingleCallback,
            Self::Multi(_) => DispatchMode::MultiCallback,
        }
    }
}

/// Maps a dispatched value or error to an action.
pub enum ActionCreator<T> {
    /// Build `{ type, payload }` (plus `error: true` for failures).
    Type(String),

    /// Build the action with a function.
    Func(Arc<dyn Fn(T) -> Action + Send + Sync>),
}

impl<T> ActionCreator<T> {
    /// Wrap an action-constructing function.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(T) -> Action + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }
}

impl ActionCreator<Value> {
    /// Map a success value.
    #[must_use]
    pub fn create(&self, value: Value) -> Action {
        match self {
            Self::Type(action_type) => Action::new(action_type.clone()).with_payload(value),
            Self::Func(f) => f(value),
        }
    }
}

impl ActionCreator<LogicError> {
    /// Map a failure.
    #[must_use]
    pub fn create(&self, error: LogicError) -> Action {
        match self {
            Self::Type(action_type) => Action::new(action_type.clone())
                .with_payload(error.to_payload())
                .with_error(true),
            Self::Func(f) => f(error),
        }
    }
}

impl<T> Clone for ActionCreator<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Type(t) => Self::Type(t.clone()),
            Self::Func(f) => Self::Func(Arc::clone(f)),
        }
    }
}

impl<T> From<&str> for ActionCreator<T> {
    fn from(value: &str) -> Self {
        Self::Type(value.to_string())
    }
}

impl<T> From<String> for ActionCreator<T> {
    fn from(value: String) -> Self {
        Self::Type(value)
    }
}

impl<T> fmt::Debug for ActionCreator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(t) => f.debug_tuple("ActionCreator::Type").field(t).finish(),
            Self::Func(_) => write!(f, "ActionCreator::Func(<fn>)"),
        }
    }
}

/// Mapping applied to values drained from the dispatch queue.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Mapping for success values.
    pub success_type: Option<ActionCreator<Value>>,

    /// Mapping for failures.
    pub fail_type: Option<ActionCreator<LogicError>>,
}

/// An immutable unit definition.
pub struct Logic {
    name: Option<String>,
    type_matcher: TypeMatcher,
    cancel_type: Option<TypeMatcher>,
    latest: bool,
    debounce: Duration,
    throttle: Duration,
    intercept: Option<InterceptFn>,
    process: Option<Process>,
    process_options: ProcessOptions,
    warn_timeout: Duration,
}

impl Logic {
    /// Start building a logic matching `type_matcher`.
    pub fn builder(type_matcher: impl Into<TypeMatcher>) -> LogicBuilder {
        LogicBuilder::new(type_matcher.into())
    }

    /// Explicit name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used when none was given, derived from the type and the
    /// logic's position in the registration sequence.
    #[must_use]
    pub fn default_name(&self, index: usize) -> String {
        format!("L({})-{index}", self.type_matcher.label())
    }

    /// The logic's type pattern.
    #[must_use]
    pub const fn type_matcher(&self) -> &TypeMatcher {
        &self.type_matcher
    }

    /// Explicit cancel pattern.
    #[must_use]
    pub const fn cancel_type(&self) -> Option<&TypeMatcher> {
        self.cancel_type.as_ref()
    }

    /// Whether a newer matching action cancels older instances.
    #[must_use]
    pub const fn latest(&self) -> bool {
        self.latest
    }

    /// Debounce window; zero disables.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Throttle window; zero disables.
    #[must_use]
    pub const fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Warn timeout; zero disables.
    #[must_use]
    pub const fn warn_timeout(&self) -> Duration {
        self.warn_timeout
    }

    /// The process hook, if any.
    #[must_use]
    pub const fn process(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    /// Process options.
    #[must_use]
    pub const fn process_options(&self) -> &ProcessOptions {
        &self.process_options
    }

    /// Dispatch mode of the process hook. Logic without a process hook
    /// behaves like a return-value hook returning nothing.
    #[must_use]
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.process
            .as_ref()
            .map_or(DispatchMode::ReturnValue, Process::mode)
    }

    /// Whether the process hook's return value is dispatched.
    #[must_use]
    pub fn dispatch_return(&self) -> bool {
        self.dispatch_mode() == DispatchMode::ReturnValue
    }

    /// Whether the process hook may dispatch more than once.
    #[must_use]
    pub fn dispatch_multiple(&self) -> bool {
        self.dispatch_mode() == DispatchMode::MultiCallback
    }

    /// Whether a custom intercept hook was declared.
    #[must_use]
    pub const fn has_intercept(&self) -> bool {
        self.intercept.is_some()
    }

    /// Whether `action_type` belongs to this logic.
    #[must_use]
    pub fn matches(&self, action_type: &str) -> bool {
        self.type_matcher.matches(action_type)
    }

    /// Run the intercept hook, or allow the action unchanged when none was
    /// declared.
    pub fn intercept(&self, ctx: &LogicContext, gate: InterceptGate) {
        match &self.intercept {
            Some(hook) => hook(ctx, gate),
            None => gate.allow(Some(ctx.action().clone())),
        }
    }
}

impl fmt::Debug for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logic")
            .field("name", &self.name)
            .field("type", &self.type_matcher)
            .field("cancel_type", &self.cancel_type)
            .field("latest", &self.latest)
            .field("debounce", &self.debounce)
            .field("throttle", &self.throttle)
            .field("dispatch_mode", &self.dispatch_mode())
            .field("warn_timeout", &self.warn_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Logic`].
#[must_use]
pub struct LogicBuilder {
    logic: Logic,
}

impl LogicBuilder {
    fn new(type_matcher: TypeMatcher) -> Self {
        Self {
            logic: Logic {
                name: None,
                type_matcher,
                cancel_type: None,
                latest: false,
                debounce: Duration::ZERO,
                throttle: Duration::ZERO,
                intercept: None,
                process: None,
                process_options: ProcessOptions::default(),
                warn_timeout: DEFAULT_WARN_TIMEOUT,
            },
        }
    }

    /// Set an explicit name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.logic.name = Some(name.into());
        self
    }

    /// Actions matching this pattern cancel in-flight instances.
    pub fn cancel_type(mut self, cancel_type: impl Into<TypeMatcher>) -> Self {
        self.logic.cancel_type = Some(cancel_type.into());
        self
    }

    /// Cancel older instances when a newer matching action arrives.
    pub const fn latest(mut self, latest: bool) -> Self {
        self.logic.latest = latest;
        self
    }

    /// Coalesce bursts into their last action.
    pub const fn debounce(mut self, window: Duration) -> Self {
        self.logic.debounce = window;
        self
    }

    /// Keep only the leading action of each window.
    pub const fn throttle(mut self, window: Duration) -> Self {
        self.logic.throttle = window;
        self
    }

    /// Advisory timeout for instances that never complete.
    pub const fn warn_timeout(mut self, timeout: Duration) -> Self {
        self.logic.warn_timeout = timeout;
        self
    }

    /// Custom intercept hook.
    pub fn intercept<F>(mut self, hook: F) -> Self
    where
        F: Fn(&LogicContext, InterceptGate) + Send + Sync + 'static,
    {
        self.logic.intercept = Some(Arc::new(hook));
        self
    }

    /// Intercept hook that always allows the returned action; `None`
    /// filters the original.
    pub fn transform<F>(self, transform: F) -> Self
    where
        F: Fn(&LogicContext) -> Option<Action> + Send + Sync + 'static,
    {
        self.intercept(move |ctx, gate| gate.allow(transform(ctx)))
    }

    /// Process hook whose return value is dispatched.
    pub fn process<F, E>(mut self, hook: F) -> Self
    where
        F: Fn(LogicContext) -> E + Send + Sync + 'static,
        E: Into<Effect>,
    {
        self.logic.process = Some(Process::Return(Arc::new(move |ctx| hook(ctx).into())));
        self
    }

    /// Process hook that dispatches once through a callback.
    #[deprecated(note = "use `process` or `process_with_done`")]
    pub fn process_with_dispatch<F>(mut self, hook: F) -> Self
    where
        F: Fn(LogicContext, Dispatch) + Send + Sync + 'static,
    {
        self.logic.process = Some(Process::Single(Arc::new(hook)));
        self
    }

    /// Process hook that dispatches any number of times and calls `done`.
    pub fn process_with_done<F>(mut self, hook: F) -> Self
    where
        F: Fn(LogicContext, Dispatch, Done) + Send + Sync + 'static,
    {
        self.logic.process = Some(Process::Multi(Arc::new(hook)));
        self
    }

    /// Map success values with `creator`.
    pub fn success_type(mut self, creator: impl Into<ActionCreator<Value>>) -> Self {
        self.logic.process_options.success_type = Some(creator.into());
        self
    }

    /// Map failures with `creator`.
    pub fn fail_type(mut self, creator: impl Into<ActionCreator<LogicError>>) -> Self {
        self.logic.process_options.fail_type = Some(creator.into());
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Arc<Logic> {
        Arc::new(self.logic)
    }
}
