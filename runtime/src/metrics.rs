//! Prometheus metrics for the logic pipeline.
//!
//! Every monitor event is counted by op, the pending count is mirrored into a
//! gauge, and instance run time is recorded as a histogram:
//! - Actions entering the pipeline and actions filtered out
//! - Lifecycle instances begun, ended and cancelled
//! - Dispatches and downstream consumer failures
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_logic_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // Serve this from your own /metrics endpoint
//! let text = exporter.render();
//! # let _ = text;
//! # Ok(())
//! # }
//! ```

use composable_logic_core::monitor::MonitorOp;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder for pipeline metrics.
///
/// Installs the global recorder and renders the exposition text; serving it
/// over HTTP is left to the host application.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that is not installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this
    /// logs a warning and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        describe_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Logic metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn describe_metrics() {
    describe_counter!(
        "logic_actions_entered_total",
        "Total number of actions that entered the pipeline"
    );
    describe_counter!(
        "logic_actions_filtered_total",
        "Total number of actions dropped by interception or the limiter"
    );
    describe_counter!(
        "logic_instances_begun_total",
        "Total number of lifecycle instances started"
    );
    describe_counter!(
        "logic_instances_ended_total",
        "Total number of lifecycle instances finished"
    );
    describe_counter!(
        "logic_instances_cancelled_total",
        "Total number of lifecycle instances cancelled"
    );
    describe_counter!(
        "logic_dispatches_total",
        "Total number of actions dispatched by process hooks"
    );
    describe_counter!(
        "logic_consumer_errors_total",
        "Total number of downstream consumer failures"
    );
    describe_gauge!(
        "logic_pending",
        "Actions and lifecycle instances currently in flight"
    );
    describe_histogram!(
        "logic_instance_duration_seconds",
        "Time from begin to end of a lifecycle instance"
    );
}

/// Pipeline metrics recorder.
pub struct LogicMetrics;

impl LogicMetrics {
    /// Count a monitor event.
    pub fn record_op(op: MonitorOp) {
        let name = match op {
            MonitorOp::Top => "logic_actions_entered_total",
            MonitorOp::Filtered => "logic_actions_filtered_total",
            MonitorOp::Begin => "logic_instances_begun_total",
            MonitorOp::End => "logic_instances_ended_total",
            MonitorOp::Cancelled | MonitorOp::DispCancelled => "logic_instances_cancelled_total",
            MonitorOp::Dispatch => "logic_dispatches_total",
            MonitorOp::NextError => "logic_consumer_errors_total",
            MonitorOp::Init
            | MonitorOp::Next
            | MonitorOp::NextDisp
            | MonitorOp::Bottom
            | MonitorOp::DispatchError => return,
        };
        counter!(name).increment(1);
    }

    /// Mirror the pending count.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_pending(count: i64) {
        gauge!("logic_pending").set(count as f64);
    }

    /// Record how long an instance ran.
    pub fn record_instance(name: &str, duration: Duration) {
        histogram!("logic_instance_duration_seconds", "logic" => name.to_string())
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exporter_starts_uninstalled() {
        let exporter = MetricsExporter::new();
        assert!(exporter.handle().is_none());
        assert!(exporter.render().is_none());
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        LogicMetrics::record_op(MonitorOp::Top);
        LogicMetrics::record_op(MonitorOp::Bottom);
        LogicMetrics::record_pending(3);
        LogicMetrics::record_instance("L(A)-0", Duration::from_millis(5));
    }

    #[tokio::test]
    async fn install_renders_recorded_metrics() {
        let mut exporter = MetricsExporter::new();
        assert!(exporter.install().is_ok());

        LogicMetrics::record_op(MonitorOp::Top);
        LogicMetrics::record_op(MonitorOp::Filtered);
        LogicMetrics::record_pending(1);

        // Another test may have installed the recorder first.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("logic_actions_entered_total"));
            assert!(rendered.contains("logic_actions_filtered_total"));
            assert!(rendered.contains("logic_pending"));
        }
    }
}
