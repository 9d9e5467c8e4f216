//! # Composable Logic Core
//!
//! Core types and contracts for the Composable Logic action middleware.
//!
//! The middleware sits between whoever dispatches actions and a downstream
//! consumer (usually a store). Each registered [`Logic`] may intercept
//! matching actions (forward, transform, or drop them) and then run an
//! asynchronous process hook whose results are dispatched as new actions.
//!
//! ## Core Concepts
//!
//! - **Action**: flux-standard-action value; only its `type` is inspected
//! - **`TypeMatcher`**: which action types a logic handles or is cancelled by
//! - **Logic**: immutable unit definition (matcher, hooks, concurrency options)
//! - **`InterceptGate`**: one-shot allow/reject decision of the intercept hook
//! - **Effect**: description of what a process hook wants dispatched
//! - **`MonitorEvent`**: append-only record of every lifecycle transition
//!
//! This crate performs no I/O and spawns nothing; execution lives in the
//! runtime crate.
//!
//! ## Example
//!
//! ```
//! use composable_logic_core::{Action, Effect, Logic, LogicError};
//!
//! let fetch_user = Logic::builder("FETCH_USER")
//!     .latest(true)
//!     .intercept(|ctx, gate| {
//!         if ctx.action().payload.is_some() {
//!             gate.allow(Some(ctx.action().clone()));
//!         } else {
//!             gate.reject(None);
//!         }
//!     })
//!     .process(|ctx| {
//!         let id = ctx.action().payload.clone();
//!         Effect::future(async move {
//!             Ok::<_, LogicError>(Some(Action::new("FETCH_USER_OK").with_payload(id.unwrap_or_default())))
//!         })
//!     })
//!     .build();
//!
//! assert!(fetch_user.matches("FETCH_USER"));
//! ```

pub mod action;
pub mod cancel;
pub mod consumer;
pub mod context;
pub mod dependencies;
pub mod dispatch;
pub mod effect;
pub mod environment;
pub mod error;
pub mod intercept;
pub mod logic;
pub mod matcher;
pub mod monitor;

// Re-export commonly used types
pub use action::{Action, UNHANDLED_LOGIC_ERROR};
pub use cancel::{CancelSignal, CancelTrigger};
pub use consumer::{Consumer, ConsumerError};
pub use context::LogicContext;
pub use dependencies::{Dependencies, Dependency};
pub use dispatch::{Dispatch, DispatchOptions, Done};
pub use effect::Effect;
pub use error::{ConfigError, LogicError};
pub use intercept::{InterceptGate, UseDispatch, Verdict, VerdictKind};
pub use logic::{ActionCreator, DispatchMode, Logic, LogicBuilder, ProcessOptions};
pub use matcher::TypeMatcher;
pub use monitor::{MonitorEvent, MonitorOp, PendingState};
