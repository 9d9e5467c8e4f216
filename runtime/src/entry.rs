//! The pipeline entry point.
//!
//! Every action, whether dispatched by the caller, by a process hook, or
//! re-dispatched by an intercept hook, enters through [`Entry::dispatch`].
//! The entry records `top` and hands the action to the head of the current
//! generation. Swapping the head retires the previous generation: its stages
//! see their input end once the old sender is dropped.

use crate::monitor::Monitor;
use composable_logic_core::action::Action;
use composable_logic_core::error::ConfigError;
use composable_logic_core::monitor::MonitorOp;
use futures::channel::mpsc::UnboundedSender;
use std::sync::{Arc, Mutex, PoisonError};

/// Shared handle to the head of the current pipeline generation.
#[derive(Clone, Debug)]
pub struct Entry {
    inner: Arc<EntryInner>,
}

#[derive(Debug)]
struct EntryInner {
    head: Mutex<Option<UnboundedSender<Action>>>,
    monitor: Monitor,
}

impl Entry {
    /// Create an entry with no generation attached.
    #[must_use]
    pub fn new(monitor: Monitor) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                head: Mutex::new(None),
                monitor,
            }),
        }
    }

    /// Whether a generation is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner
            .head
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Route new actions to `head`, returning the previous head.
    ///
    /// Dropping the returned sender retires the previous generation.
    pub(crate) fn swap_head(
        &self,
        head: UnboundedSender<Action>,
    ) -> Option<UnboundedSender<Action>> {
        self.inner
            .head
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(head)
    }

    /// Feed an action into the pipeline.
    ///
    /// Returns the action once it is queued; its effects happen
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingConsumer`] if no generation is attached.
    #[tracing::instrument(skip(self, action), fields(action_type = %action.action_type), name = "logic_dispatch")]
    pub fn dispatch(&self, action: Action) -> Result<Action, ConfigError> {
        let head = self
            .inner
            .head
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = head.as_ref() else {
            return Err(ConfigError::MissingConsumer);
        };

        let monitor = &self.inner.monitor;
        monitor.emit(monitor.event(MonitorOp::Top).with_action(action.clone()));

        if let Err(err) = tx.unbounded_send(action.clone()) {
            // The head stage is gone; balance the top we just recorded.
            tracing::warn!("Pipeline head closed, dropping action");
            monitor.emit(
                monitor
                    .event(MonitorOp::Filtered)
                    .with_action(err.into_inner())
                    .with_error("pipeline closed"),
            );
        } else {
            tracing::trace!("Action entered pipeline");
        }
        Ok(action)
    }
}
