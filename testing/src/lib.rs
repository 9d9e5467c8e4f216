//! # Composable Logic Testing
//!
//! Testing utilities and helpers for the Composable Logic action middleware.
//!
//! This crate provides:
//! - Mock implementations of the consumer and clock contracts
//! - A recorder for monitor events
//! - In-memory capture of tracing output
//! - A fluent Given-When-Then harness for a single logic
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```no_run
//! use composable_logic_core::{Action, Logic};
//! use composable_logic_testing::LogicTest;
//!
//! # async fn example() {
//! let logic = Logic::builder("PING")
//!     .process(|_ctx| Action::new("PONG"))
//!     .build();
//!
//! LogicTest::new(logic)
//!     .when_action(Action::new("PING"))
//!     .then_dispatched(|actions| {
//!         let types: Vec<_> = actions.iter().map(Action::action_type).collect();
//!         assert_eq!(types, vec!["PING", "PONG"]);
//!     })
//!     .run()
//!     .await;
//! # }
//! ```

use chrono::{DateTime, Utc};
use composable_logic_core::environment::Clock;

/// Ergonomic harness for testing one logic end to end
pub mod logic_test;

pub use logic_test::LogicTest;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use composable_logic_core::action::Action;
    use composable_logic_core::consumer::{Consumer, ConsumerError};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making monitor timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_logic_testing::mocks::FixedClock;
    /// use composable_logic_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    type FailWhen = Arc<dyn Fn(&Action) -> bool + Send + Sync>;

    /// Consumer that records every action it receives.
    ///
    /// Clones share the same log, so keep one clone for assertions and
    /// attach another.
    #[derive(Clone, Default)]
    pub struct RecordingConsumer {
        received: Arc<Mutex<Vec<Action>>>,
        fail_when: Option<FailWhen>,
    }

    impl RecordingConsumer {
        /// Create a consumer that accepts everything
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail (after recording) every action matching `predicate`
        #[must_use]
        pub fn failing_when<F>(predicate: F) -> Self
        where
            F: Fn(&Action) -> bool + Send + Sync + 'static,
        {
            Self {
                received: Arc::default(),
                fail_when: Some(Arc::new(predicate)),
            }
        }

        /// Everything received so far, in order
        #[must_use]
        pub fn actions(&self) -> Vec<Action> {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Types of everything received so far, in order
        #[must_use]
        pub fn types(&self) -> Vec<String> {
            self.actions()
                .into_iter()
                .map(|action| action.action_type)
                .collect()
        }

        /// Number of actions received
        #[must_use]
        pub fn len(&self) -> usize {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Whether nothing was received
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Forget everything received
        pub fn clear(&self) {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        /// Shareable handle for [`LogicMiddleware::attach`](composable_logic_runtime::LogicMiddleware::attach)
        #[must_use]
        pub fn shared(&self) -> Arc<dyn Consumer> {
            Arc::new(self.clone())
        }
    }

    impl Consumer for RecordingConsumer {
        fn dispatch(&self, action: Action) -> Result<Action, ConsumerError> {
            self.received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(action.clone());
            match &self.fail_when {
                Some(fail) if fail(&action) => Err(ConsumerError::new(&action, "rejected by test")),
                _ => Ok(action),
            }
        }
    }

    impl std::fmt::Debug for RecordingConsumer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RecordingConsumer")
                .field("received", &self.len())
                .field("failing", &self.fail_when.is_some())
                .finish()
        }
    }
}

/// Monitor event capture.
pub mod recorder {
    use composable_logic_core::monitor::{MonitorEvent, MonitorOp};
    use composable_logic_runtime::Monitor;
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::broadcast::{self, error::TryRecvError};

    /// Collects monitor events emitted after its creation.
    ///
    /// Events are pulled from the subscription whenever they are read, so
    /// the recorder needs no background task.
    #[derive(Debug)]
    pub struct MonitorRecorder {
        subscription: Mutex<broadcast::Receiver<MonitorEvent>>,
        events: Mutex<Vec<MonitorEvent>>,
    }

    impl MonitorRecorder {
        /// Start recording `monitor`
        #[must_use]
        pub fn new(monitor: &Monitor) -> Self {
            Self {
                subscription: Mutex::new(monitor.subscribe()),
                events: Mutex::new(Vec::new()),
            }
        }

        /// Every event recorded so far
        #[must_use]
        pub fn events(&self) -> Vec<MonitorEvent> {
            let mut subscription = self
                .subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                match subscription.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Lagged(missed)) => {
                        eprintln!("MonitorRecorder lagged; {missed} events lost");
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
            events.clone()
        }

        /// Ops of every event recorded so far
        #[must_use]
        pub fn ops(&self) -> Vec<MonitorOp> {
            self.events().into_iter().map(|event| event.op).collect()
        }

        /// Ops of events about actions of `action_type`
        #[must_use]
        pub fn ops_for(&self, action_type: &str) -> Vec<MonitorOp> {
            self.events()
                .into_iter()
                .filter(|event| {
                    event
                        .action
                        .as_ref()
                        .is_some_and(|action| action.action_type == action_type)
                })
                .map(|event| event.op)
                .collect()
        }

        /// How many events carry `op`
        #[must_use]
        pub fn count(&self, op: MonitorOp) -> usize {
            self.ops().into_iter().filter(|o| *o == op).count()
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use composable_logic_core::action::Action;
    use proptest::prelude::*;

    /// Upper-case action types such as `FETCH_USER`
    pub fn action_type() -> impl Strategy<Value = String> {
        "[A-Z][A-Z_]{0,15}"
    }

    /// Actions with an optional integer payload
    pub fn action() -> impl Strategy<Value = Action> {
        (action_type(), proptest::option::of(any::<i64>())).prop_map(|(action_type, payload)| {
            let action = Action::new(action_type);
            match payload {
                Some(payload) => action.with_payload(payload),
                None => action,
            }
        })
    }
}

/// Tracing output capture.
pub mod logs {
    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};
    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::util::SubscriberInitExt;

    /// Collects formatted tracing output in memory.
    ///
    /// Capturing is scoped to the current thread, so it sees tasks spawned on
    /// a current-thread runtime such as the one `#[tokio::test]` builds.
    #[derive(Debug, Clone, Default)]
    pub struct LogCapture {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl LogCapture {
        /// Create an empty capture
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Route this thread's tracing output here until the guard drops
        #[must_use = "capturing stops when the guard is dropped"]
        pub fn set_default(&self) -> DefaultGuard {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_max_level(tracing::Level::TRACE)
                .with_writer(move || writer.clone())
                .finish()
                .set_default()
        }

        /// Everything captured so far
        #[must_use]
        pub fn contents(&self) -> String {
            let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&buffer).into_owned()
        }

        /// Whether any captured line contains `needle`
        #[must_use]
        pub fn contains(&self, needle: &str) -> bool {
            self.contents().contains(needle)
        }
    }

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

/// Install a test tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use logs::LogCapture;
pub use mocks::{FixedClock, RecordingConsumer, test_clock};
pub use recorder::MonitorRecorder;

#[cfg(test)]
mod tests {
    use super::*;
    use composable_logic_core::action::Action;
    use composable_logic_core::consumer::Consumer;
    use composable_logic_core::monitor::MonitorOp;
    use composable_logic_runtime::Monitor;
    use std::sync::Arc;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn recording_consumer_records_and_fails_on_demand() {
        let consumer = RecordingConsumer::failing_when(|a| a.action_type == "BAD");
        assert!(consumer.dispatch(Action::new("OK")).is_ok());
        assert!(consumer.dispatch(Action::new("BAD")).is_err());
        assert_eq!(consumer.types(), vec!["OK", "BAD"]);

        consumer.clear();
        assert!(consumer.is_empty());
    }

    #[test]
    fn recorder_collects_events_in_order() {
        let monitor = Monitor::new(16, Arc::new(test_clock()));
        let recorder = MonitorRecorder::new(&monitor);

        monitor.emit(monitor.event(MonitorOp::Top).with_action(Action::new("A")));
        monitor.emit(monitor.event(MonitorOp::Bottom).with_action(Action::new("A")));

        assert_eq!(recorder.ops(), vec![MonitorOp::Top, MonitorOp::Bottom]);
        assert_eq!(recorder.ops_for("A").len(), 2);
        assert_eq!(recorder.count(MonitorOp::Top), 1);
        assert!(recorder.events().iter().all(|e| e.at == test_clock().now()));
    }

    #[test]
    fn log_capture_sees_events_while_guard_lives() {
        let logs = LogCapture::new();
        {
            let _guard = logs.set_default();
            tracing::warn!(logic = "L(A)-0", "captured advisory");
        }
        tracing::warn!("after the guard");

        assert!(logs.contains("captured advisory"));
        assert!(logs.contains("L(A)-0"));
        assert!(!logs.contains("after the guard"));
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
