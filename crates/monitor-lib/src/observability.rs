//! Observability infrastructure for the building monitor
//!
//! Provides:
//! - Prometheus metrics (sampling and detection latency, sensor count, totals)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    sampling_latency_seconds: Histogram,
    detection_latency_seconds: Histogram,
    sensors_monitored: IntGauge,
    readings_total: IntCounter,
    sensor_read_errors_total: IntCounter,
    anomalies_total: IntCounter,
    alerts_total: IntCounter,
    loop_errors_total: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            sampling_latency_seconds: register_histogram!(
                "building_monitor_sampling_latency_seconds",
                "Time spent reading every active sensor once",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sampling_latency_seconds"),

            detection_latency_seconds: register_histogram!(
                "building_monitor_detection_latency_seconds",
                "Time spent in one anomaly detection cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_latency_seconds"),

            sensors_monitored: register_int_gauge!(
                "building_monitor_sensors_monitored",
                "Number of sensors currently registered"
            )
            .expect("Failed to register sensors_monitored"),

            readings_total: register_int_counter!(
                "building_monitor_readings_total",
                "Total number of sensor readings collected"
            )
            .expect("Failed to register readings_total"),

            sensor_read_errors_total: register_int_counter!(
                "building_monitor_sensor_read_errors_total",
                "Total number of failed sensor reads"
            )
            .expect("Failed to register sensor_read_errors_total"),

            anomalies_total: register_int_counter!(
                "building_monitor_anomalies_total",
                "Total number of anomalies detected"
            )
            .expect("Failed to register anomalies_total"),

            alerts_total: register_int_counter!(
                "building_monitor_alerts_total",
                "Total number of alerts raised"
            )
            .expect("Failed to register alerts_total"),

            loop_errors_total: register_int_counter!(
                "building_monitor_loop_errors_total",
                "Total number of failed monitoring loop iterations"
            )
            .expect("Failed to register loop_errors_total"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying collectors.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (registers the collectors on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_sampling_latency(&self, duration_secs: f64) {
        self.inner().sampling_latency_seconds.observe(duration_secs);
    }

    pub fn observe_detection_latency(&self, duration_secs: f64) {
        self.inner().detection_latency_seconds.observe(duration_secs);
    }

    pub fn set_sensors_monitored(&self, count: i64) {
        self.inner().sensors_monitored.set(count);
    }

    pub fn add_readings(&self, count: u64) {
        self.inner().readings_total.inc_by(count);
    }

    pub fn inc_sensor_read_errors(&self) {
        self.inner().sensor_read_errors_total.inc();
    }

    pub fn add_anomalies(&self, count: u64) {
        self.inner().anomalies_total.inc_by(count);
    }

    pub fn add_alerts(&self, count: u64) {
        self.inner().alerts_total.inc_by(count);
    }

    pub fn inc_loop_errors(&self) {
        self.inner().loop_errors_total.inc();
    }
}

/// Structured logger for monitor lifecycle and detection events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn log_startup(&self, version: &str, sensor_count: usize) {
        info!(
            event = "monitor_started",
            node = %self.node_name,
            version = %version,
            sensor_count = sensor_count,
            "Building monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_stopped",
            node = %self.node_name,
            reason = %reason,
            "Building monitor stopped"
        );
    }

    /// Log a failed read of a single sensor
    pub fn log_sensor_failure(&self, sensor_id: &str, error: &str) {
        warn!(
            event = "sensor_read_failed",
            node = %self.node_name,
            sensor_id = %sensor_id,
            error = %error,
            "Error reading sensor"
        );
    }

    /// Log the outcome of one detection cycle
    pub fn log_detection_cycle(
        &self,
        sensors: usize,
        anomalies: usize,
        alerts: usize,
        pruned: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "detection_cycle",
            node = %self.node_name,
            sensors = sensors,
            anomalies = anomalies,
            alerts = alerts,
            pruned = pruned,
            elapsed_ms = elapsed_ms,
            "Detection cycle complete"
        );
    }

    pub fn log_loop_error(&self, error: &anyhow::Error, backoff_secs: f64) {
        error!(
            event = "loop_error",
            node = %self.node_name,
            error = %format!("{:#}", error),
            backoff_secs = backoff_secs,
            "Error in monitoring loop"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_metrics_creation() {
        let metrics = MonitorMetrics::new();
        let clone = metrics.clone();

        metrics.observe_sampling_latency(0.001);
        metrics.observe_detection_latency(0.02);
        metrics.set_sensors_monitored(12);
        clone.add_readings(12);
        clone.inc_sensor_read_errors();
        metrics.add_anomalies(3);
        metrics.add_alerts(1);
        metrics.inc_loop_errors();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "building_monitor_readings_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
    }
}
