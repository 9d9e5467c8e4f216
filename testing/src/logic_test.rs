//! Ergonomic testing utilities for logic
//!
//! This module provides a fluent API for running one logic inside a real
//! middleware with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // LogicTest is the natural name

use crate::mocks::{RecordingConsumer, test_clock};
use crate::recorder::MonitorRecorder;
use composable_logic_core::{Action, Dependencies, Logic, MonitorEvent};
use composable_logic_runtime::{LogicMiddleware, PipelineConfig};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for dispatched-action assertion functions
type ActionAssertion = Box<dyn FnOnce(&[Action])>;

/// Type alias for monitor-event assertion functions
type EventAssertion = Box<dyn FnOnce(&[MonitorEvent])>;

/// Fluent API for testing a logic with Given-When-Then syntax
///
/// The logic runs inside a [`LogicMiddleware`] attached to a
/// [`RecordingConsumer`]. `run` dispatches every action, waits until nothing
/// is in flight, then runs the assertions against what reached the consumer
/// and what the monitor recorded.
///
/// # Example
///
/// ```no_run
/// use composable_logic_core::{Action, Dependencies, Logic};
/// use composable_logic_testing::LogicTest;
///
/// # async fn example() {
/// let greet = Logic::builder("GREET")
///     .process(|ctx| {
///         let name = ctx.dependency::<String>("name").map(|n| n.to_string());
///         Action::new("GREETED").with_payload(name.unwrap_or_default())
///     })
///     .build();
///
/// LogicTest::new(greet)
///     .given_deps(Dependencies::new().with("name", "Ada".to_string()))
///     .when_action(Action::new("GREET"))
///     .then_dispatched(|actions| {
///         assert_eq!(actions[1].payload, Some("Ada".into()));
///     })
///     .run()
///     .await;
/// # }
/// ```
pub struct LogicTest {
    logics: Vec<Arc<Logic>>,
    dependencies: Dependencies,
    config: PipelineConfig,
    consumer: RecordingConsumer,
    actions: Vec<Action>,
    settle_timeout: Duration,
    action_assertions: Vec<ActionAssertion>,
    event_assertions: Vec<EventAssertion>,
}

impl LogicTest {
    /// Create a new test for the given logic
    #[must_use]
    pub fn new(logic: Arc<Logic>) -> Self {
        Self {
            logics: vec![logic],
            dependencies: Dependencies::new(),
            config: PipelineConfig::default()
                .with_warn_timeouts(false)
                .with_clock(Arc::new(test_clock())),
            consumer: RecordingConsumer::new(),
            actions: Vec::new(),
            settle_timeout: Duration::from_secs(5),
            action_assertions: Vec::new(),
            event_assertions: Vec::new(),
        }
    }

    /// Register more logic after the first one
    #[must_use]
    pub fn and_logic(mut self, logic: Arc<Logic>) -> Self {
        self.logics.push(logic);
        self
    }

    /// Set the dependencies (Given)
    #[must_use]
    pub fn given_deps(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Use a custom consumer, e.g. [`RecordingConsumer::failing_when`]
    #[must_use]
    pub fn given_consumer(mut self, consumer: RecordingConsumer) -> Self {
        self.consumer = consumer;
        self
    }

    /// Override the middleware configuration
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// How long `run` waits for the pipeline to settle
    #[must_use]
    pub const fn settle_within(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Add an action to dispatch (When)
    #[must_use]
    pub fn when_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about what reached the consumer (Then)
    #[must_use]
    pub fn then_dispatched<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Action]) + 'static,
    {
        self.action_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the recorded monitor events (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[MonitorEvent]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// Must be awaited inside a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the logic cannot be registered, if the pipeline does not
    /// settle within the timeout, or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub async fn run(self) {
        let middleware = LogicMiddleware::with_config(self.logics, self.dependencies, self.config)
            .expect("logic must register");
        let recorder = MonitorRecorder::new(middleware.monitor());
        middleware
            .attach(self.consumer.shared())
            .expect("consumer must attach");

        for action in self.actions {
            middleware.dispatch(action).expect("middleware is attached");
        }

        let settled =
            tokio::time::timeout(self.settle_timeout, middleware.monitor().settled()).await;
        assert!(
            settled.is_ok(),
            "pipeline did not settle within {:?}; pending = {:?}",
            self.settle_timeout,
            middleware.monitor().pending()
        );

        let actions = self.consumer.actions();
        for assertion in self.action_assertions {
            assertion(&actions);
        }

        let events = recorder.events();
        for assertion in self.event_assertions {
            assertion(&events);
        }
    }
}

/// Helper assertions for dispatched actions and monitor events
pub mod assertions {
    use composable_logic_core::{Action, MonitorEvent, MonitorOp, PendingState};

    /// Assert the types of the dispatched actions, in order
    ///
    /// # Panics
    ///
    /// Panics if the types differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_types(actions: &[Action], expected: &[&str]) {
        let types: Vec<&str> = actions.iter().map(Action::action_type).collect();
        assert_eq!(types, expected, "Unexpected dispatched action types");
    }

    /// Assert that the events fold to an idle pending state
    ///
    /// # Panics
    ///
    /// Panics if the fold ends with work still in flight or ever goes
    /// negative.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_balanced(events: &[MonitorEvent]) {
        let mut state = PendingState::INITIAL;
        for event in events {
            state = state.apply(event);
            assert!(
                state.pending_count >= 0,
                "Pending count went negative at {:?}",
                event.op
            );
        }
        assert!(state.is_idle(), "Events leave {} in flight", state.pending_count);
    }

    /// Assert how many events carry `op`
    ///
    /// # Panics
    ///
    /// Panics if the count differs.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_op_count(events: &[MonitorEvent], op: MonitorOp, expected: usize) {
        let count = events.iter().filter(|event| event.op == op).count();
        assert_eq!(count, expected, "Expected {expected} {op} events, found {count}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composable_logic_core::{Effect, LogicError, MonitorOp};

    #[tokio::test]
    async fn test_passthrough_reaches_consumer() {
        LogicTest::new(Logic::builder("OTHER").build())
            .when_action(Action::new("PING"))
            .then_dispatched(|actions| assertions::assert_types(actions, &["PING"]))
            .then_events(|events| {
                assertions::assert_balanced(events);
                assertions::assert_op_count(events, MonitorOp::Begin, 0);
            })
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_process_result_is_dispatched() {
        let logic = Logic::builder("PING")
            .process(|_ctx| Effect::future(async { Ok::<_, LogicError>(Some(Action::new("PONG"))) }))
            .build();

        LogicTest::new(logic)
            .when_action(Action::new("PING"))
            .then_dispatched(|actions| assertions::assert_types(actions, &["PING", "PONG"]))
            .then_events(|events| {
                assertions::assert_balanced(events);
                assertions::assert_op_count(events, MonitorOp::Dispatch, 1);
            })
            .run()
            .await;
    }

    #[tokio::test]
    async fn test_dependencies_reach_hooks() {
        let logic = Logic::builder("GREET")
            .process(|ctx| {
                let name = ctx.dependency::<String>("name").map(|n| n.to_string());
                Action::new("GREETED").with_payload(name.unwrap_or_default())
            })
            .build();

        LogicTest::new(logic)
            .given_deps(Dependencies::new().with("name", "Ada".to_string()))
            .when_action(Action::new("GREET"))
            .then_dispatched(|actions| {
                assert_eq!(actions.len(), 2);
                assert_eq!(actions[1].payload, Some("Ada".into()));
            })
            .run()
            .await;
    }
}
