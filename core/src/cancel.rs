//! One-shot cancellation signals.
//!
//! Each logic owns a [`CancelTrigger`]. Every time an action matching the
//! logic's cancel set arrives, the trigger's epoch is bumped. An instance's
//! [`CancelSignal`] is stamped with the epoch observed when its action
//! arrived, so it fires on the first bump *after* that point and never on the
//! bump caused by its own action.

use std::sync::Arc;
use tokio::sync::watch;

/// Broadcasts cancellation to every in-flight instance of one logic.
#[derive(Debug, Clone)]
pub struct CancelTrigger {
    epoch: Arc<watch::Sender<u64>>,
}

impl CancelTrigger {
    /// Create a trigger at epoch zero.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { epoch: Arc::new(tx) }
    }

    /// Cancel every signal stamped before now.
    pub fn fire(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    /// A signal that fires on the next [`fire`](Self::fire).
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            epoch: self.epoch.subscribe(),
            stamp: self.epoch(),
        }
    }

    /// A signal stamped at a previously observed epoch.
    #[must_use]
    pub fn signal_at(&self, stamp: u64) -> CancelSignal {
        CancelSignal {
            epoch: self.epoch.subscribe(),
            stamp,
        }
    }
}

impl Default for CancelTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes cancellation of a single lifecycle instance.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    epoch: watch::Receiver<u64>,
    stamp: u64,
}

impl CancelSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self { epoch: rx, stamp: 0 }
    }

    /// Whether cancellation has already happened.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.epoch.borrow() > self.stamp
    }

    /// Run `f` unless already cancelled.
    ///
    /// A concurrent [`CancelTrigger::fire`] waits until `f` returns, so
    /// whatever `f` does is never observed after the cancellation.
    /// `f` must not fire the same trigger.
    pub fn run_unless_cancelled<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let epoch = self.epoch.borrow();
        if *epoch > self.stamp {
            return None;
        }
        let out = f();
        drop(epoch);
        Some(out)
    }

    /// Resolves once cancelled. Never resolves if the trigger is dropped first.
    pub async fn cancelled(&self) {
        let stamp = self.stamp;
        let mut epoch = self.epoch.clone();
        if epoch.wait_for(|e| *e > stamp).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fire_cancels_existing_signals() {
        let trigger = CancelTrigger::new();
        let signal = trigger.signal();
        assert!(!signal.is_cancelled());

        trigger.fire();
        assert!(signal.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn signals_created_after_fire_are_not_cancelled() {
        let trigger = CancelTrigger::new();
        trigger.fire();
        let signal = trigger.signal();
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn stamped_signal_sees_bumps_after_stamp() {
        let trigger = CancelTrigger::new();
        let stamp = trigger.epoch();
        trigger.fire();
        assert!(trigger.signal_at(stamp).is_cancelled());
    }

    #[test]
    fn run_unless_cancelled_skips_after_fire() {
        let trigger = CancelTrigger::new();
        let signal = trigger.signal();
        assert_eq!(signal.run_unless_cancelled(|| 1), Some(1));
        trigger.fire();
        assert_eq!(signal.run_unless_cancelled(|| 2), None);
    }

    #[test]
    fn cancelled_wakes_waiter_on_fire() {
        let trigger = CancelTrigger::new();
        let signal = trigger.signal();
        let mut waiting = tokio_test::task::spawn(signal.cancelled());
        tokio_test::assert_pending!(waiting.poll());

        trigger.fire();
        assert!(waiting.is_woken());
        tokio_test::assert_ready!(waiting.poll());
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
