//! The per-action lifecycle engine.
//!
//! An [`Instance`] is created for every matched action that survives the
//! limiter. It runs interception, forwards or re-dispatches the verdict's
//! action, then (when allowed) runs the process hook and drains its dispatch
//! queue in submission order until the queue completes or the instance is
//! cancelled.
//!
//! Monitor bookkeeping per instance:
//! - `begin` on start and exactly one `end` on completion
//! - exactly one of `next`+downstream, `nextDisp`, `filtered` or `cancelled`
//!   for the triggering action
//! - `dispatch` per dispatched action, `dispCancelled` when cancelled while
//!   draining

use crate::entry::Entry;
use crate::metrics::LogicMetrics;
use crate::monitor::Monitor;
use composable_logic_core::action::{Action, UNHANDLED_LOGIC_ERROR};
use composable_logic_core::cancel::CancelSignal;
use composable_logic_core::context::LogicContext;
use composable_logic_core::dependencies::Dependencies;
use composable_logic_core::dispatch::{self, Dispatch, Done, QueueMessage, QueueReceiver};
use composable_logic_core::effect::{Effect, EffectItem};
use composable_logic_core::error::LogicError;
use composable_logic_core::intercept::{InterceptGate, Verdict};
use composable_logic_core::logic::{Logic, Process};
use composable_logic_core::monitor::{MonitorEvent, MonitorOp};
use futures::StreamExt;
use futures::channel::mpsc::UnboundedSender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Everything an instance needs from its stage.
#[derive(Clone)]
pub(crate) struct InstanceEnv {
    pub(crate) logic: Arc<Logic>,
    pub(crate) name: Arc<str>,
    pub(crate) dependencies: Dependencies,
    pub(crate) monitor: Monitor,
    pub(crate) entry: Entry,
    pub(crate) output: UnboundedSender<Action>,
    pub(crate) warn_timeouts: bool,
}

/// One lifecycle instance.
pub(crate) struct Instance {
    env: InstanceEnv,
    action: Action,
    cancel: CancelSignal,
}

/// Emits `end` (and balances an unsettled `top`) however the instance stops.
struct EndGuard {
    monitor: Monitor,
    action: Action,
    name: Arc<str>,
    top_settled: bool,
    started: Instant,
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        if !self.top_settled {
            tracing::error!(logic = %self.name, "Logic instance aborted before interception finished");
            self.monitor.emit(
                self.monitor
                    .event(MonitorOp::Filtered)
                    .with_action(self.action.clone())
                    .with_name(self.name.as_ref())
                    .with_error("instance aborted"),
            );
        }
        self.monitor.emit(
            self.monitor
                .event(MonitorOp::End)
                .with_action(self.action.clone())
                .with_name(self.name.as_ref()),
        );
        LogicMetrics::record_instance(&self.name, self.started.elapsed());
    }
}

/// Aborts the warn timer when the instance finishes.
struct WarnTimer(JoinHandle<()>);

impl Drop for WarnTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Instance {
    pub(crate) const fn new(env: InstanceEnv, action: Action, cancel: CancelSignal) -> Self {
        Self {
            env,
            action,
            cancel,
        }
    }

    fn event(&self, op: MonitorOp) -> MonitorEvent {
        self.env
            .monitor
            .event(op)
            .with_action(self.action.clone())
            .with_name(self.env.name.as_ref())
    }

    fn emit(&self, event: MonitorEvent) {
        self.env.monitor.emit(event);
    }

    /// Run the instance to completion.
    #[tracing::instrument(
        skip(self),
        fields(logic = %self.env.name, action_type = %self.action.action_type),
        name = "logic_instance"
    )]
    pub(crate) async fn run(self) {
        self.emit(self.event(MonitorOp::Begin));
        tracing::debug!("Logic instance begun");

        let mut guard = EndGuard {
            monitor: self.env.monitor.clone(),
            action: self.action.clone(),
            name: Arc::clone(&self.env.name),
            top_settled: false,
            started: Instant::now(),
        };
        let _warn = self.arm_warn_timer();

        let ctx = LogicContext::new(
            self.action.clone(),
            Arc::clone(&self.env.name),
            self.env.dependencies.clone(),
            self.cancel.clone(),
        );

        let Some(verdict) = self.intercept(&ctx).await else {
            guard.top_settled = true;
            return;
        };
        self.forward(&verdict);
        guard.top_settled = true;

        if !verdict.should_process() {
            tracing::debug!(
                filtered = verdict.action.is_none(),
                "Logic instance stops without processing"
            );
            return;
        }
        let Some(process) = self.env.logic.process() else {
            return;
        };
        let queue = self.start_process(process, ctx);
        self.drain(queue).await;
        tracing::debug!("Logic instance finished");
    }

    fn arm_warn_timer(&self) -> Option<WarnTimer> {
        let timeout = self.env.logic.warn_timeout();
        if !self.env.warn_timeouts || timeout.is_zero() {
            return None;
        }
        let name = Arc::clone(&self.env.name);
        let action_type = self.action.action_type.clone();
        let dispatch_mode = self.env.logic.dispatch_mode();
        Some(WarnTimer(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::warn!(
                logic = %name,
                action_type = %action_type,
                timeout_ms = duration_ms(timeout),
                ?dispatch_mode,
                "Logic instance has not completed within its warn timeout; \
                 a multi-dispatch process hook must call done()"
            );
        })))
    }

    /// Run the intercept hook. `None` means the instance was cancelled first.
    async fn intercept(&self, ctx: &LogicContext) -> Option<Verdict> {
        if self.cancel.is_cancelled() {
            self.emit(self.event(MonitorOp::Cancelled));
            tracing::debug!("Logic instance cancelled before interception");
            return None;
        }

        let (gate, verdict) = InterceptGate::new();
        self.env.logic.intercept(ctx, gate);

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.emit(self.event(MonitorOp::Cancelled));
                tracing::debug!("Logic instance cancelled during interception");
                None
            }
            verdict = verdict => Some(verdict.unwrap_or_else(|_| {
                tracing::warn!("Intercept gate dropped without allow or reject; rejecting");
                Verdict::dropped()
            })),
        }
    }

    /// Send the verdict's action onward; settles the triggering action's `top`.
    fn forward(&self, verdict: &Verdict) {
        let Some(action) = verdict.action.clone() else {
            self.emit(self.event(MonitorOp::Filtered));
            tracing::debug!("Action filtered by interception");
            return;
        };

        if verdict.should_dispatch(&self.action) {
            self.emit(
                self.event(MonitorOp::NextDisp)
                    .with_dispatched(action.clone()),
            );
            if let Err(error) = self.env.entry.dispatch(action) {
                tracing::error!(%error, "Failed to re-dispatch intercepted action");
            }
            return;
        }

        self.emit(self.event(MonitorOp::Next).with_dispatched(action.clone()));
        if let Err(err) = self.env.output.unbounded_send(action) {
            tracing::warn!("Stage output closed, dropping forwarded action");
            self.emit(
                self.env
                    .monitor
                    .event(MonitorOp::Filtered)
                    .with_action(err.into_inner())
                    .with_name(self.env.name.as_ref())
                    .with_error("stage output closed"),
            );
        }
    }

    /// Invoke the process hook and return its dispatch queue.
    fn start_process(&self, process: &Process, ctx: LogicContext) -> QueueReceiver {
        let (tx, rx) = dispatch::queue();
        match process {
            Process::Return(hook) => {
                let effect = catch_panic(|| hook(ctx)).unwrap_or_else(Effect::Error);
                let _ = tx.send(QueueMessage::Effect(effect));
                let _ = tx.send(QueueMessage::Complete);
            }
            Process::Single(hook) => {
                let dispatch = Dispatch::new(tx.clone(), true);
                if let Err(error) = catch_panic(|| hook(ctx, dispatch)) {
                    let _ = tx.send(QueueMessage::Effect(Effect::Error(error)));
                    let _ = tx.send(QueueMessage::Complete);
                }
            }
            Process::Multi(hook) => {
                let dispatch = Dispatch::new(tx.clone(), false);
                let done = Done::new(tx.clone());
                if let Err(error) = catch_panic(|| hook(ctx, dispatch, done)) {
                    let _ = tx.send(QueueMessage::Effect(Effect::Error(error)));
                    let _ = tx.send(QueueMessage::Complete);
                }
            }
        }
        rx
    }

    /// Drain the dispatch queue in submission order.
    async fn drain(&self, mut queue: QueueReceiver) {
        loop {
            let message = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.dispatch_cancelled(),
                message = queue.recv() => message,
            };

            match message {
                Some(QueueMessage::Effect(effect)) => {
                    let mut items = AssertUnwindSafe(effect.into_stream()).catch_unwind();
                    loop {
                        let item = tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => return self.dispatch_cancelled(),
                            item = items.next() => item,
                        };
                        let Some(item) = item else { break };
                        let item = item.unwrap_or_else(|payload| {
                            Err(LogicError::Panicked(panic_message(payload.as_ref())))
                        });
                        let action = self.to_action(item);
                        if !self.dispatch(action) {
                            return self.dispatch_cancelled();
                        }
                    }
                }
                Some(QueueMessage::Complete) => return,
                None => {
                    tracing::debug!("Every dispatch handle dropped without done(); completing");
                    return;
                }
            }
        }
    }

    fn dispatch_cancelled(&self) {
        self.emit(self.event(MonitorOp::DispCancelled));
        tracing::debug!("Logic instance cancelled while dispatching");
    }

    /// Map a drained item through `success_type` / `fail_type`.
    fn to_action(&self, item: EffectItem) -> Action {
        let options = self.env.logic.process_options();
        match item {
            Ok(value) => match &options.success_type {
                Some(creator) => creator.create(value),
                None => Action::try_from(value)
                    .unwrap_or_else(|not_an_action| self.failure(not_an_action.into())),
            },
            Err(error) => self.failure(error),
        }
    }

    fn failure(&self, error: LogicError) -> Action {
        if let Some(creator) = &self.env.logic.process_options().fail_type {
            tracing::debug!(%error, "Process failure mapped by fail_type");
            return creator.create(error);
        }
        match error {
            LogicError::Action(action) => action,
            other => {
                tracing::warn!(error = %other, "Unhandled process failure");
                Action::new(UNHANDLED_LOGIC_ERROR)
                    .with_payload(other.to_payload())
                    .with_error(true)
            }
        }
    }

    /// Dispatch unless cancelled. Returns `false` when cancelled.
    fn dispatch(&self, action: Action) -> bool {
        self.cancel
            .run_unless_cancelled(|| {
                self.emit(
                    self.event(MonitorOp::Dispatch)
                        .with_dispatched(action.clone()),
                );
                tracing::trace!(dispatched = %action.action_type, "Dispatching");
                if let Err(error) = self.env.entry.dispatch(action) {
                    tracing::error!(%error, "Failed to dispatch processed action");
                }
            })
            .is_some()
    }
}

fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, LogicError> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| LogicError::Panicked(panic_message(payload.as_ref())))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
