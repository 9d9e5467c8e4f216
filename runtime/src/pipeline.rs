//! Pipeline composition.
//!
//! A generation is a chain of [`Stage`]s, one per registered logic, in
//! registration order. Each stage splits its input: actions matching the
//! logic go through the limiter into lifecycle instances, everything else
//! passes straight to the stage output. The last stage's output feeds the
//! downstream [`Consumer`], recording `bottom` (and `nextError` on failure).
//!
//! ```text
//! Entry ──▶ Stage(L0) ──▶ Stage(L1) ──▶ … ──▶ forward_to_consumer
//!              │ matched
//!              ▼
//!           limiter ──▶ Instance ──▶ next / nextDisp / dispatch
//! ```

use crate::entry::Entry;
use crate::lifecycle::{self, Instance, InstanceEnv};
use crate::limiter::{self, OnDrop};
use crate::monitor::Monitor;
use composable_logic_core::action::Action;
use composable_logic_core::cancel::CancelTrigger;
use composable_logic_core::consumer::Consumer;
use composable_logic_core::dependencies::Dependencies;
use composable_logic_core::logic::Logic;
use composable_logic_core::matcher::{self, TypeMatcher};
use composable_logic_core::monitor::MonitorOp;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;

/// A stream of actions between stages.
pub type ActionStream = BoxStream<'static, Action>;

/// Dependencies shared by every stage; injections are visible to instances
/// started afterwards.
pub type SharedDependencies = Arc<RwLock<Dependencies>>;

/// One logic's slot in a generation.
#[derive(Clone)]
pub struct Stage {
    logic: Arc<Logic>,
    name: Arc<str>,
    cancel_on: Option<TypeMatcher>,
    trigger: CancelTrigger,
}

/// Shared plumbing every stage of a generation uses.
#[derive(Clone)]
pub struct StageServices {
    /// Monitor of the owning middleware
    pub monitor: Monitor,
    /// Entry point for re-dispatched and processed actions
    pub entry: Entry,
    /// Dependencies handed to hooks
    pub dependencies: SharedDependencies,
    /// Whether warn-timeout advisories are armed
    pub warn_timeouts: bool,
}

impl Stage {
    /// Create the stage for `logic` under `name`.
    #[must_use]
    pub fn new(logic: Arc<Logic>, name: impl Into<Arc<str>>) -> Self {
        let cancel_on = limiter::cancel_matcher(&logic);
        Self {
            logic,
            name: name.into(),
            cancel_on,
            trigger: CancelTrigger::new(),
        }
    }

    /// The logic this stage runs.
    #[must_use]
    pub const fn logic(&self) -> &Arc<Logic> {
        &self.logic
    }

    /// Resolved name of the logic.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the stage over `input` and return its output.
    ///
    /// The output ends once the input has ended and every instance started
    /// by this stage has finished.
    pub fn apply<S>(self, input: S, services: &StageServices) -> ActionStream
    where
        S: Stream<Item = Action> + Send + 'static,
    {
        let (output, out_rx) = mpsc::unbounded();
        let (matched_tx, matched_rx) = mpsc::unbounded::<(Action, u64)>();

        tokio::spawn(self.clone().run_limiter(matched_rx, output.clone(), services.clone()));
        tokio::spawn(self.route(input, matched_tx, output, services.monitor.clone()));
        out_rx.boxed()
    }

    /// Split the input into matched and passthrough actions.
    ///
    /// An action that cannot be handed on is reported as `filtered`; the
    /// input keeps draining so every entered action is settled.
    async fn route<S>(
        self,
        input: S,
        matched: UnboundedSender<(Action, u64)>,
        output: UnboundedSender<Action>,
        monitor: Monitor,
    ) where
        S: Stream<Item = Action> + Send + 'static,
    {
        let mut input = Box::pin(input);
        while let Some(action) = input.next().await {
            if matcher::matches(self.cancel_on.as_ref(), &action.action_type) {
                tracing::debug!(logic = %self.name, action_type = %action.action_type, "Cancelling in-flight instances");
                self.trigger.fire();
            }

            let undelivered = if self.logic.matches(&action.action_type) {
                // Stamped after this action's own cancellation.
                let stamp = self.trigger.epoch();
                matched
                    .unbounded_send((action, stamp))
                    .err()
                    .map(|err| (err.into_inner().0, "limiter stopped"))
            } else {
                output
                    .unbounded_send(action)
                    .err()
                    .map(|err| (err.into_inner(), "stage output closed"))
            };

            if let Some((action, reason)) = undelivered {
                tracing::warn!(logic = %self.name, action_type = %action.action_type, reason, "Dropping action");
                monitor.emit(
                    monitor
                        .event(MonitorOp::Filtered)
                        .with_action(action)
                        .with_name(self.name.as_ref())
                        .with_error(reason),
                );
            }
        }
        tracing::debug!(logic = %self.name, "Stage input ended");
    }

    /// Start an instance for every action the limiter lets through.
    async fn run_limiter(
        self,
        matched: UnboundedReceiver<(Action, u64)>,
        output: UnboundedSender<Action>,
        services: StageServices,
    ) {
        let on_drop: OnDrop<(Action, u64)> = {
            let monitor = services.monitor.clone();
            let name = Arc::clone(&self.name);
            Arc::new(move |(action, _stamp)| {
                tracing::trace!(logic = %name, action_type = %action.action_type, "Action suppressed by limiter");
                monitor.emit(
                    monitor
                        .event(MonitorOp::Filtered)
                        .with_action(action)
                        .with_name(name.as_ref()),
                );
            })
        };
        let mut limited = limiter::limit(
            matched,
            self.logic.debounce(),
            self.logic.throttle(),
            on_drop,
        );

        while let Some((action, stamp)) = limited.next().await {
            let env = InstanceEnv {
                logic: Arc::clone(&self.logic),
                name: Arc::clone(&self.name),
                dependencies: services
                    .dependencies
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
                monitor: services.monitor.clone(),
                entry: services.entry.clone(),
                output: output.clone(),
                warn_timeouts: services.warn_timeouts,
            };
            let instance = Instance::new(env, action, self.trigger.signal_at(stamp));
            tokio::spawn(instance.run());
        }
    }
}

/// Chain `stages` over `input`, in order.
pub fn compose<S>(input: S, stages: Vec<Stage>, services: &StageServices) -> ActionStream
where
    S: Stream<Item = Action> + Send + 'static,
{
    stages
        .into_iter()
        .fold(input.boxed(), |stream, stage| stage.apply(stream, services))
}

/// Deliver the pipeline output to `consumer`.
///
/// A consumer that fails, by error or by panic, is reported as `nextError`
/// and the next action is still delivered.
pub fn forward_to_consumer(
    output: ActionStream,
    consumer: Arc<dyn Consumer>,
    monitor: Monitor,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut output = output;
        while let Some(action) = output.next().await {
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| {
                consumer.dispatch(action.clone())
            })) {
                Ok(Ok(_)) => None,
                Ok(Err(error)) => Some(error.to_string()),
                Err(payload) => Some(format!(
                    "consumer panicked: {}",
                    lifecycle::panic_message(payload.as_ref())
                )),
            };
            if let Some(error) = failure {
                tracing::error!(%error, action_type = %action.action_type, "Downstream consumer failed");
                monitor.emit(
                    monitor
                        .event(MonitorOp::NextError)
                        .with_action(action.clone())
                        .with_error(error),
                );
            }
            monitor.emit(monitor.event(MonitorOp::Bottom).with_action(action));
        }
        tracing::debug!("Pipeline generation drained");
    })
}
