//! Runtime configuration.

use composable_logic_core::environment::{Clock, SystemClock};
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`LogicMiddleware`](crate::LogicMiddleware).
///
/// # Example
///
/// ```
/// use composable_logic_runtime::PipelineConfig;
///
/// let config = PipelineConfig::default()
///     .with_monitor_capacity(4096)
///     .with_warn_timeouts(false);
/// assert_eq!(config.monitor_capacity, 4096);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Buffer size of the monitor broadcast channel
    pub monitor_capacity: usize,
    /// Whether warn-timeout advisories are armed
    pub warn_timeouts: bool,
    /// Clock used to timestamp monitor events
    pub clock: Arc<dyn Clock>,
}

impl PipelineConfig {
    /// Set the monitor broadcast capacity
    #[must_use]
    pub const fn with_monitor_capacity(mut self, capacity: usize) -> Self {
        self.monitor_capacity = capacity;
        self
    }

    /// Arm or disarm warn-timeout advisories
    #[must_use]
    pub const fn with_warn_timeouts(mut self, enabled: bool) -> Self {
        self.warn_timeouts = enabled;
        self
    }

    /// Set the clock used for monitor timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            monitor_capacity: 1024,
            // Advisories only make sense while developing.
            warn_timeouts: cfg!(debug_assertions),
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("monitor_capacity", &self.monitor_capacity)
            .field("warn_timeouts", &self.warn_timeouts)
            .finish_non_exhaustive()
    }
}
