//! The intercept gate.
//!
//! An intercept hook receives an [`InterceptGate`] and must settle it with
//! exactly one of [`allow`](InterceptGate::allow) or
//! [`reject`](InterceptGate::reject), either before returning or later from a
//! spawned task. The gate is consumed by settling, so a second call does not
//! compile. A gate dropped unsettled is treated as `reject(None)`.
//!
//! # Examples
//!
//! ```
//! use composable_logic_core::intercept::{InterceptGate, UseDispatch, VerdictKind};
//! use composable_logic_core::action::Action;
//!
//! let (gate, mut verdict) = InterceptGate::new();
//! gate.allow_with(Some(Action::new("RENAMED")), UseDispatch::Never);
//!
//! let verdict = verdict.try_recv().unwrap();
//! assert_eq!(verdict.kind, VerdictKind::Allow);
//! assert!(!verdict.should_dispatch(&Action::new("ORIGINAL")));
//! ```

use crate::action::Action;
use tokio::sync::oneshot;

/// How a forwarded action reaches the downstream side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UseDispatch {
    /// Re-dispatch through the entry point only when the type changed.
    #[default]
    Auto,

    /// Always re-dispatch through the entry point.
    Always,

    /// Always forward along the pipeline.
    Never,
}

/// Which way the gate was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictKind {
    /// Forward and run the process hook.
    Allow,

    /// Forward but skip the process hook.
    Reject,
}

/// The outcome of interception.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Allow or reject.
    pub kind: VerdictKind,

    /// Action to forward; `None` filters the original out.
    pub action: Option<Action>,

    /// Forwarding mode.
    pub use_dispatch: UseDispatch,
}

impl Verdict {
    /// The verdict assumed for a gate dropped without being settled.
    #[must_use]
    pub const fn dropped() -> Self {
        Self {
            kind: VerdictKind::Reject,
            action: None,
            use_dispatch: UseDispatch::Auto,
        }
    }

    /// Whether the process hook may run. Filtering the action out stops the
    /// instance even when it was allowed.
    #[must_use]
    pub const fn should_process(&self) -> bool {
        matches!(self.kind, VerdictKind::Allow) && self.action.is_some()
    }

    /// Whether the forwarded action re-enters through the entry point
    /// instead of continuing down the pipeline.
    #[must_use]
    pub fn should_dispatch(&self, original: &Action) -> bool {
        match (&self.action, self.use_dispatch) {
            (None, _) | (Some(_), UseDispatch::Never) => false,
            (Some(_), UseDispatch::Always) => true,
            (Some(action), UseDispatch::Auto) => !action.same_type(original),
        }
    }
}

/// One-shot handle an intercept hook settles.
#[derive(Debug)]
#[must_use = "an unsettled gate rejects the action"]
pub struct InterceptGate {
    tx: oneshot::Sender<Verdict>,
}

impl InterceptGate {
    /// Create a gate and the receiver of its verdict.
    pub fn new() -> (Self, oneshot::Receiver<Verdict>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Forward `action` and run the process hook. `None` filters the original
    /// out and ends the instance without processing.
    pub fn allow(self, action: Option<Action>) {
        self.allow_with(action, UseDispatch::Auto);
    }

    /// [`allow`](Self::allow) with an explicit forwarding mode.
    pub fn allow_with(self, action: Option<Action>, use_dispatch: UseDispatch) {
        self.settle(Verdict {
            kind: VerdictKind::Allow,
            action,
            use_dispatch,
        });
    }

    /// Forward `action` (or filter when `None`) without processing.
    pub fn reject(self, action: Option<Action>) {
        self.reject_with(action, UseDispatch::Auto);
    }

    /// [`reject`](Self::reject) with an explicit forwarding mode.
    pub fn reject_with(self, action: Option<Action>, use_dispatch: UseDispatch) {
        self.settle(Verdict {
            kind: VerdictKind::Reject,
            action,
            use_dispatch,
        });
    }

    fn settle(self, verdict: Verdict) {
        // The receiver is gone once the instance was cancelled.
        let _ = self.tx.send(verdict);
    }
}
