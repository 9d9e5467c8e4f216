//! Lifecycle monitor events and the pending-count fold.
//!
//! Every transition of every action and lifecycle instance is recorded as a
//! [`MonitorEvent`]. [`PendingState::apply`] folds those events into the
//! number of actions and instances still in flight:
//!
//! | op | effect on `pending_count` |
//! |---|---|
//! | `top`, `begin` | +1 |
//! | `end`, `bottom`, `nextDisp`, `filtered`, `cancelled`, `dispatchError` | −1 |
//! | everything else | 0 |
//!
//! Each `top` is balanced by exactly one of `bottom`, `filtered`, `nextDisp`
//! or `cancelled`; each `begin` by exactly one `end`.

use crate::action::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorOp {
    /// Initial marker.
    Init,
    /// An action entered the pipeline.
    Top,
    /// A lifecycle instance started.
    Begin,
    /// Interception forwarded an action down the pipeline.
    Next,
    /// Interception re-dispatched a different action through the entry point.
    NextDisp,
    /// A process hook dispatched an action.
    Dispatch,
    /// The downstream consumer failed.
    NextError,
    /// A lifecycle instance finished.
    End,
    /// An action reached the downstream consumer.
    Bottom,
    /// An action was dropped by interception or the limiter.
    Filtered,
    /// An instance was cancelled before interception finished.
    Cancelled,
    /// An instance was cancelled while dispatching.
    DispCancelled,
    /// Reserved; never emitted.
    DispatchError,
}

impl MonitorOp {
    /// Contribution of this op to the pending count.
    #[must_use]
    pub const fn delta(self) -> i64 {
        match self {
            Self::Top | Self::Begin => 1,
            Self::End
            | Self::Bottom
            | Self::NextDisp
            | Self::Filtered
            | Self::Cancelled
            | Self::DispatchError => -1,
            Self::Init | Self::Next | Self::Dispatch | Self::NextError | Self::DispCancelled => 0,
        }
    }

    /// The tag used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Top => "top",
            Self::Begin => "begin",
            Self::Next => "next",
            Self::NextDisp => "nextDisp",
            Self::Dispatch => "dispatch",
            Self::NextError => "nextError",
            Self::End => "end",
            Self::Bottom => "bottom",
            Self::Filtered => "filtered",
            Self::Cancelled => "cancelled",
            Self::DispCancelled => "dispCancelled",
            Self::DispatchError => "dispatchError",
        }
    }
}

impl fmt::Display for MonitorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    /// What happened.
    pub op: MonitorOp,

    /// The action the transition concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    /// Name of the logic involved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Action forwarded or dispatched as a result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched: Option<Action>,

    /// Error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the transition was recorded.
    pub at: DateTime<Utc>,
}

impl MonitorEvent {
    /// Create an event with only an op.
    #[must_use]
    pub const fn new(op: MonitorOp, at: DateTime<Utc>) -> Self {
        Self {
            op,
            action: None,
            name: None,
            dispatched: None,
            error: None,
            at,
        }
    }

    /// Attach the action.
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Attach the logic name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach the forwarded or dispatched action.
    #[must_use]
    pub fn with_dispatched(mut self, action: Action) -> Self {
        self.dispatched = Some(action);
        self
    }

    /// Attach an error description.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Running in-flight count derived from monitor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingState {
    /// Op of the last folded event.
    pub op: MonitorOp,

    /// Actions and instances still in flight.
    pub pending_count: i64,

    /// How many times the count returned to zero.
    pub settlements: u64,
}

impl PendingState {
    /// The seed state.
    pub const INITIAL: Self = Self {
        op: MonitorOp::Init,
        pending_count: 0,
        settlements: 0,
    };

    /// Fold one event into the state.
    #[must_use]
    pub const fn apply(self, event: &MonitorEvent) -> Self {
        let delta = event.op.delta();
        let pending_count = self.pending_count + delta;
        let settled = delta < 0 && pending_count == 0;
        Self {
            op: event.op,
            pending_count,
            settlements: if settled {
                self.settlements + 1
            } else {
                self.settlements
            },
        }
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.pending_count == 0
    }
}

impl Default for PendingState {
    fn default() -> Self {
        Self::INITIAL
    }
}
