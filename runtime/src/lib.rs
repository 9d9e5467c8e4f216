//! # Composable Logic Runtime
//!
//! Runtime implementation for the Composable Logic action middleware.
//!
//! This crate provides [`LogicMiddleware`], which sits between whoever
//! dispatches actions and a downstream [`Consumer`], runs every registered
//! [`Logic`] over the actions flowing through, and tracks everything still in
//! flight.
//!
//! ## Core Components
//!
//! - **Entry**: the single entry point every action goes through
//! - **Pipeline**: one stage per logic, chained in registration order
//! - **Limiter**: debounce, throttle and cancellation ahead of each logic
//! - **Lifecycle engine**: interception, processing and dispatch per action
//! - **Monitor**: event bus plus the pending counter behind `when_complete`
//!
//! ## Example
//!
//! ```no_run
//! use composable_logic_core::{Action, Consumer, ConsumerError, Dependencies, Logic};
//! use composable_logic_runtime::LogicMiddleware;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetch = Logic::builder("FETCH")
//!     .latest(true)
//!     .process(|ctx| Action::new("FETCH_OK").with_payload(ctx.action().payload.clone().unwrap_or_default()))
//!     .build();
//!
//! let middleware = LogicMiddleware::new(vec![fetch], Dependencies::new())?;
//! let store = |action: Action| -> Result<Action, ConsumerError> { Ok(action) };
//! middleware.attach(Arc::new(store))?;
//!
//! middleware.dispatch(Action::new("FETCH").with_payload(1))?;
//! middleware.monitor().when_complete(|| ()).await;
//! # Ok(())
//! # }
//! ```

use composable_logic_core::{Action, ConfigError, Consumer, Dependencies, Logic, MonitorOp};
use futures::channel::mpsc;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Runtime configuration
pub mod config;

/// The pipeline entry point
pub mod entry;

/// Per-action lifecycle engine
mod lifecycle;

/// Debounce, throttle and cancel-set derivation
pub mod limiter;

/// Prometheus metrics for observability
pub mod metrics;

/// Monitor bus and pending tracker
pub mod monitor;

/// Stage chaining and delivery to the consumer
pub mod pipeline;

pub use config::PipelineConfig;
pub use entry::Entry;
pub use monitor::Monitor;
pub use pipeline::{SharedDependencies, Stage, StageServices};

/// Error types for the middleware
pub mod error {
    pub use crate::metrics::MetricsError;
    pub use composable_logic_core::error::{ConfigError, LogicError};
    pub use composable_logic_core::consumer::ConsumerError;
}

/// The action middleware.
///
/// Cheap to clone; clones share the same pipeline, monitor and
/// dependencies.
#[derive(Clone)]
pub struct LogicMiddleware {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    monitor: Monitor,
    entry: Entry,
    dependencies: SharedDependencies,
    registry: Mutex<Registry>,
}

/// Current generation and the consumer it feeds.
struct Registry {
    stages: Vec<Stage>,
    consumer: Option<Arc<dyn Consumer>>,
    generation: u64,
}

impl LogicMiddleware {
    /// Create a middleware with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLogic`] if the same logic appears twice.
    pub fn new(logics: Vec<Arc<Logic>>, dependencies: Dependencies) -> Result<Self, ConfigError> {
        Self::with_config(logics, dependencies, PipelineConfig::default())
    }

    /// Create a middleware with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLogic`] if the same logic appears twice.
    pub fn with_config(
        logics: Vec<Arc<Logic>>,
        dependencies: Dependencies,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        check_unique(&logics, &[])?;

        let monitor = Monitor::new(config.monitor_capacity, Arc::clone(&config.clock));
        monitor.emit(monitor.event(MonitorOp::Init));
        let stages = build_stages(logics, 0, &[]);
        tracing::debug!(logics = stages.len(), "Logic middleware created");

        Ok(Self {
            inner: Arc::new(Inner {
                entry: Entry::new(monitor.clone()),
                monitor,
                dependencies: Arc::new(RwLock::new(dependencies)),
                registry: Mutex::new(Registry {
                    stages,
                    consumer: None,
                    generation: 0,
                }),
                config,
            }),
        })
    }

    /// Bind the downstream consumer and start the first generation.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AlreadyAttached`] on a second call.
    pub fn attach(&self, consumer: Arc<dyn Consumer>) -> Result<(), ConfigError> {
        let mut registry = self.registry();
        if registry.consumer.is_some() {
            return Err(ConfigError::AlreadyAttached);
        }
        registry.consumer = Some(consumer);
        self.compose(&registry);
        tracing::info!(logics = registry.stages.len(), "Logic middleware attached");
        Ok(())
    }

    /// Feed an action into the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingConsumer`] before [`attach`](Self::attach).
    pub fn dispatch(&self, action: Action) -> Result<Action, ConfigError> {
        self.inner.entry.dispatch(action)
    }

    /// Append logic, starting a new generation.
    ///
    /// Instances already running on the previous generation finish there.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLogic`] if a logic is repeated in
    /// `logics` or already registered. Nothing is registered on error.
    pub fn add_logic(&self, logics: Vec<Arc<Logic>>) -> Result<(), ConfigError> {
        let mut registry = self.registry();
        check_unique(&logics, &registry.stages)?;

        let offset = registry.stages.len();
        let added = build_stages(logics, offset, &[]);
        tracing::debug!(added = added.len(), "Adding logic");
        registry.stages.extend(added);
        self.next_generation(&mut registry);
        Ok(())
    }

    /// Append only the logic not registered yet.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLogic`] if a new logic is repeated in
    /// `logics`.
    pub fn merge_new_logic(&self, logics: Vec<Arc<Logic>>) -> Result<(), ConfigError> {
        let fresh: Vec<Arc<Logic>> = {
            let registry = self.registry();
            logics
                .into_iter()
                .filter(|logic| {
                    !registry
                        .stages
                        .iter()
                        .any(|stage| Arc::ptr_eq(stage.logic(), logic))
                })
                .collect()
        };
        self.add_logic(fresh)
    }

    /// Replace every registered logic, starting a fresh generation whose
    /// default names count from zero again.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateLogic`] if a logic is repeated in
    /// `logics`.
    pub fn replace_logic(&self, logics: Vec<Arc<Logic>>) -> Result<(), ConfigError> {
        check_unique(&logics, &[])?;
        let mut registry = self.registry();
        let stages = build_stages(logics, 0, &registry.stages);
        tracing::debug!(logics = stages.len(), "Replacing logic");
        registry.stages = stages;
        self.next_generation(&mut registry);
        Ok(())
    }

    /// Inject more dependencies. Re-injecting the same value is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DependencyConflict`] if a key is already
    /// bound to a different value. Nothing is injected on error.
    pub fn add_deps(&self, dependencies: &Dependencies) -> Result<(), ConfigError> {
        self.inner
            .dependencies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .inject(dependencies)
    }

    /// Number of logic in the current generation.
    #[must_use]
    pub fn logic_count(&self) -> usize {
        self.registry().stages.len()
    }

    /// Names of the logic in the current generation, in order.
    #[must_use]
    pub fn logic_names(&self) -> Vec<String> {
        self.registry()
            .stages
            .iter()
            .map(|stage| stage.name().to_string())
            .collect()
    }

    /// How many times the pipeline was rebuilt.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.registry().generation
    }

    /// Snapshot of the injected dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Dependencies {
        self.inner
            .dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The monitor: event subscription, pending state, `when_complete`.
    #[must_use]
    pub fn monitor(&self) -> &Monitor {
        &self.inner.monitor
    }

    /// The configuration this middleware was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Whether a consumer is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.entry.is_attached()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self, registry: &mut Registry) {
        registry.generation += 1;
        self.compose(registry);
    }

    /// Build the current generation and route new actions to it. The
    /// previous generation drains on its own.
    fn compose(&self, registry: &Registry) {
        let Some(consumer) = registry.consumer.clone() else {
            return;
        };
        let services = StageServices {
            monitor: self.inner.monitor.clone(),
            entry: self.inner.entry.clone(),
            dependencies: Arc::clone(&self.inner.dependencies),
            warn_timeouts: self.inner.config.warn_timeouts,
        };
        let (head, input) = mpsc::unbounded();
        let output = pipeline::compose(input, registry.stages.clone(), &services);
        pipeline::forward_to_consumer(output, consumer, self.inner.monitor.clone());

        if self.inner.entry.swap_head(head).is_some() {
            tracing::debug!(generation = registry.generation, "Retired previous generation");
        }
    }
}

impl fmt::Debug for LogicMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicMiddleware")
            .field("logics", &self.logic_names())
            .field("generation", &self.generation())
            .field("attached", &self.is_attached())
            .field("pending", &self.inner.monitor.pending())
            .finish_non_exhaustive()
    }
}

/// Resolved name: explicit, or derived from the logic's position.
fn resolve_name(logic: &Logic, index: usize) -> String {
    logic
        .name()
        .map_or_else(|| logic.default_name(index), ToString::to_string)
}

/// Reject logic repeated within `logics` or already present in `registered`.
fn check_unique(logics: &[Arc<Logic>], registered: &[Stage]) -> Result<(), ConfigError> {
    for (i, logic) in logics.iter().enumerate() {
        let repeated = logics[..i].iter().any(|other| Arc::ptr_eq(other, logic));
        let present = registered
            .iter()
            .any(|stage| Arc::ptr_eq(stage.logic(), logic));
        if repeated || present {
            return Err(ConfigError::DuplicateLogic {
                name: resolve_name(logic, registered.len() + i),
            });
        }
    }
    Ok(())
}

/// Stages for `logics`, numbered from `offset`. A logic already running in
/// `previous` keeps its stage so its cancellation reaches older instances.
fn build_stages(logics: Vec<Arc<Logic>>, offset: usize, previous: &[Stage]) -> Vec<Stage> {
    logics
        .into_iter()
        .enumerate()
        .map(|(i, logic)| {
            let name = resolve_name(&logic, offset + i);
            previous
                .iter()
                .find(|stage| Arc::ptr_eq(stage.logic(), &logic) && stage.name() == name)
                .cloned()
                .unwrap_or_else(|| Stage::new(logic, name))
        })
        .collect()
}
