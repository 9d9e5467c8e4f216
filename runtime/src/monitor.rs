//! Monitor bus and pending tracker.
//!
//! One [`Monitor`] is owned by each middleware. Every emitted
//! [`MonitorEvent`] is folded into the [`PendingState`] and broadcast to
//! subscribers under the same lock, so subscribers observe events in fold
//! order.

use crate::metrics::LogicMetrics;
use composable_logic_core::environment::Clock;
use composable_logic_core::monitor::{MonitorEvent, MonitorOp, PendingState};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Event bus plus in-flight counter.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    events: broadcast::Sender<MonitorEvent>,
    pending: watch::Sender<PendingState>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    /// Create a monitor whose broadcast buffers `capacity` events.
    #[must_use]
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (pending, _) = watch::channel(PendingState::INITIAL);
        Self {
            inner: Arc::new(MonitorInner {
                events,
                pending,
                clock,
            }),
        }
    }

    /// A fresh event stamped with the monitor's clock.
    #[must_use]
    pub fn event(&self, op: MonitorOp) -> MonitorEvent {
        MonitorEvent::new(op, self.inner.clock.now())
    }

    /// Record an event.
    pub fn emit(&self, event: MonitorEvent) {
        LogicMetrics::record_op(event.op);
        self.inner.pending.send_modify(|state| {
            *state = state.apply(&event);
            if state.pending_count < 0 {
                tracing::error!(
                    op = %event.op,
                    pending = state.pending_count,
                    "Pending count went negative"
                );
            }
            LogicMetrics::record_pending(state.pending_count);
            tracing::trace!(op = %event.op, pending = state.pending_count, "Monitor event");
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        });
    }

    /// Subscribe to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Current pending state.
    #[must_use]
    pub fn pending(&self) -> PendingState {
        *self.inner.pending.borrow()
    }

    /// Observe pending state changes.
    #[must_use]
    pub fn watch_pending(&self) -> watch::Receiver<PendingState> {
        self.inner.pending.subscribe()
    }

    /// Resolve once nothing is in flight.
    ///
    /// Resolves immediately when idle; otherwise resolves the first time the
    /// count returns to zero, even if new work starts right after.
    pub async fn settled(&self) {
        let mut rx = self.inner.pending.subscribe();
        let start = *rx.borrow_and_update();
        if start.is_idle() {
            return;
        }
        let _ = rx
            .wait_for(|state| state.is_idle() || state.settlements > start.settlements)
            .await;
    }

    /// Run `on_complete` once nothing is in flight and return its result.
    pub async fn when_complete<F, T>(&self, on_complete: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.settled().await;
        on_complete()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("pending", &self.pending())
            .field("subscribers", &self.inner.events.receiver_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composable_logic_core::environment::SystemClock;
    use std::time::Duration;

    fn monitor() -> Monitor {
        Monitor::new(16, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn emit_folds_and_broadcasts() {
        let monitor = monitor();
        let mut rx = monitor.subscribe();

        monitor.emit(monitor.event(MonitorOp::Top));
        assert_eq!(monitor.pending().pending_count, 1);

        let event = rx.recv().await;
        assert_eq!(event.map(|e| e.op).ok(), Some(MonitorOp::Top));
    }

    #[tokio::test]
    async fn settled_resolves_immediately_when_idle() {
        let monitor = monitor();
        let result = tokio::time::timeout(Duration::from_millis(50), monitor.settled()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn when_complete_waits_for_zero() {
        let monitor = monitor();
        monitor.emit(monitor.event(MonitorOp::Top));

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.when_complete(|| "done").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        monitor.emit(monitor.event(MonitorOp::Bottom));
        let result = tokio::time::timeout(Duration::from_millis(200), waiter).await;
        assert_eq!(result.ok().and_then(Result::ok), Some("done"));
    }

    #[tokio::test]
    async fn settled_does_not_miss_a_transient_zero() {
        let monitor = monitor();
        monitor.emit(monitor.event(MonitorOp::Top));

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.settled().await })
        };
        tokio::task::yield_now().await;

        // Drop to zero and immediately start new work.
        monitor.emit(monitor.event(MonitorOp::Bottom));
        monitor.emit(monitor.event(MonitorOp::Top));

        let result = tokio::time::timeout(Duration::from_millis(200), waiter).await;
        assert!(result.is_ok());
    }
}
