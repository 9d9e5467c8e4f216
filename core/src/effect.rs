//! Values handed to the dispatch queue.
//!
//! A process hook produces [`Effect`]s: descriptions of what should be
//! dispatched, not the dispatching itself. The runtime normalizes every
//! effect into a stream with [`Effect::into_stream`] and drains those streams
//! strictly in submission order.
//!
//! | effect | normalized stream |
//! |---|---|
//! | `None` | empty |
//! | `Value(v)` | yields `Ok(v)` once |
//! | `Error(e)` | yields `Err(e)` once |
//! | `Future(f)` | yields the resolved value once (nothing for `Ok(None)`) |
//! | `Stream(s)` | used as-is |

use crate::action::Action;
use crate::error::LogicError;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use futures::{Future, Stream};
use serde_json::Value;
use std::fmt;

/// Item produced by a normalized effect stream.
pub type EffectItem = Result<Value, LogicError>;

/// Stream of dispatch results.
pub type EffectStream = BoxStream<'static, EffectItem>;

/// Something a process hook wants dispatched.
#[derive(Default)]
pub enum Effect {
    /// Nothing to dispatch.
    #[default]
    None,

    /// A ready success value.
    Value(Value),

    /// A ready failure.
    Error(LogicError),

    /// A deferred value; `Ok(None)` dispatches nothing.
    Future(BoxFuture<'static, Result<Option<Value>, LogicError>>),

    /// Any number of values over time.
    Stream(EffectStream),
}

impl Effect {
    /// Dispatch a ready action.
    #[must_use]
    pub fn action(action: Action) -> Self {
        Self::Value(Value::from(action))
    }

    /// Dispatch a ready value (mapped through `success_type` when set).
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Dispatch a failure.
    #[must_use]
    pub fn error(error: impl Into<LogicError>) -> Self {
        Self::Error(error.into())
    }

    /// Dispatch the outcome of a future.
    pub fn future<F, T>(future: F) -> Self
    where
        F: Future<Output = Result<Option<T>, LogicError>> + Send + 'static,
        T: Into<Value>,
    {
        Self::Future(Box::pin(async move { future.await.map(|v| v.map(Into::into)) }))
    }

    /// Dispatch every item of a stream.
    pub fn stream<S, T>(items: S) -> Self
    where
        S: Stream<Item = Result<T, LogicError>> + Send + 'static,
        T: Into<Value>,
    {
        Self::Stream(items.map(|item| item.map(Into::into)).boxed())
    }

    /// Whether this effect dispatches nothing.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Normalize into a stream of results.
    #[must_use]
    pub fn into_stream(self) -> EffectStream {
        match self {
            Self::None => stream::empty().boxed(),
            Self::Value(value) => stream::once(async move { Ok(value) }).boxed(),
            Self::Error(error) => stream::once(async move { Err(error) }).boxed(),
            Self::Future(future) => stream::once(future)
                .filter_map(|outcome| async move { outcome.transpose() })
                .boxed(),
            Self::Stream(items) => items,
        }
    }
}

impl From<Action> for Effect {
    fn from(action: Action) -> Self {
        Self::action(action)
    }
}

impl From<Option<Action>> for Effect {
    fn from(action: Option<Action>) -> Self {
        action.map_or(Self::None, Self::action)
    }
}

impl From<LogicError> for Effect {
    fn from(error: LogicError) -> Self {
        Self::Error(error)
    }
}

impl<T: Into<Value>> From<Result<T, LogicError>> for Effect {
    fn from(result: Result<T, LogicError>) -> Self {
        match result {
            Ok(value) => Self::Value(value.into()),
            Err(error) => Self::Error(error),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "Effect::None"),
            Self::Value(v) => f.debug_tuple("Effect::Value").field(v).finish(),
            Self::Error(e) => f.debug_tuple("Effect::Error").field(e).finish(),
            Self::Future(_) => write!(f, "Effect::Future(<future>)"),
            Self::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
        }
    }
}
