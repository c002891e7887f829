//! Metric emission: the sink abstraction, concrete sinks, the per-field timing
//! guard and the Prometheus recorder used by the binary.
//!
//! The observer never talks to a metrics backend directly; it hands finished
//! measurements to a [`MetricsSink`]. [`RecorderSink`] forwards them to the
//! global `metrics` recorder, [`InMemorySink`] keeps them for inspection.

pub mod core;
pub mod registry;
pub mod sink;

pub use self::core::FieldTimer;
pub use registry::{MetricDoc, MetricType};
pub use sink::{InMemorySink, MeasurementKind, RecordedMeasurement, RecorderSink};

use crate::constants::GqlMetric;
use crate::error::{Result, TelemetryError};
use crate::tags::TagSet;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

/// Destination of every measurement. Failures are logged by the caller and
/// never retried.
pub trait MetricsSink: Send + Sync {
    fn record_timer(&self, name: &str, tags: &TagSet, duration: Duration) -> Result<()>;
    fn increment_counter(&self, name: &str, tags: &TagSet) -> Result<()>;
}

/// Records a timer, logging instead of propagating sink failures.
pub fn emit_timer(sink: &dyn MetricsSink, metric: GqlMetric, tags: &TagSet, duration: Duration) {
    if let Err(e) = sink.record_timer(metric.as_str(), tags, duration) {
        warn!(metric = %metric, error = %e, "Failed to record timer");
    }
}

/// Increments a counter, logging instead of propagating sink failures.
pub fn emit_counter(sink: &dyn MetricsSink, metric: GqlMetric, tags: &TagSet) {
    if let Err(e) = sink.increment_counter(metric.as_str(), tags) {
        warn!(metric = %metric, error = %e, "Failed to increment counter");
    }
}

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Idempotent. Metric descriptions are registered on first install.
pub fn install_prometheus_recorder() -> Result<()> {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Prometheus handle was already stored");
            }
            registry::register_all_metrics();
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    });

    HANDLE
        .get()
        .map(|_| ())
        .ok_or_else(|| TelemetryError::Exporter("Prometheus recorder is not installed".to_string()))
}

/// Current exposition text, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}
