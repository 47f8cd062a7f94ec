//! Monitoring loop
//!
//! A single worker task samples every active sensor once per
//! `sampling_interval` and runs anomaly detection whenever
//! `anomaly_check_interval` has elapsed since the previous detection.
//! The inter-sample sleep races a shutdown channel, so `stop()` never waits
//! for a full interval.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{SensorRegistry, SensorSource};
use crate::anomaly::{AlertProcessor, AnomalyAggregator, AnomalySummary, WindowStatistics};
use crate::config::MonitoringConfig;
use crate::error::ExportError;
use crate::export::ExportSnapshot;
use crate::models::{
    Alert, Anomaly, Reading, ReadingSnapshot, SensorInfo, Severity, SnapshotEntry, StateSummary,
};
use crate::observability::{MonitorMetrics, StructuredLogger};

/// Point-in-time view of the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub is_running: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub runtime_seconds: Option<f64>,
    pub total_readings: u64,
    pub total_anomalies: u64,
    pub building_name: String,
    pub sensor_count: usize,
    pub zone_count: usize,
    /// Alerts raised in the last 24 hours
    pub recent_alerts_count: usize,
}

/// Per-sensor description plus window statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatistics {
    pub sensor_info: SensorInfo,
    pub is_active: bool,
    /// `None` when the sensor has no readings in the requested window
    pub statistics: Option<WindowStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingOverview {
    pub name: String,
    pub zones: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorHealth {
    pub total: usize,
    pub active: usize,
    pub health_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertOverview {
    pub total_24h: usize,
    pub critical: usize,
    pub high: usize,
    /// Newest first
    pub recent: Vec<Alert>,
}

/// Everything an operator dashboard shows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    pub timestamp: DateTime<Utc>,
    pub building: BuildingOverview,
    pub sensors: SensorHealth,
    pub alerts: AlertOverview,
    pub monitoring: MonitoringStatus,
    pub anomaly_summary: AnomalySummary,
}

/// Number of alerts listed on the dashboard
const DASHBOARD_RECENT_ALERTS: usize = 5;

/// State shared between the caller-facing handle and the worker task
struct Shared {
    config: MonitoringConfig,
    registry: Arc<SensorRegistry>,
    aggregator: RwLock<AnomalyAggregator>,
    alerts: AlertProcessor,
    history: RwLock<VecDeque<ReadingSnapshot>>,
    building_name: String,
    running: AtomicBool,
    start_time: Mutex<Option<DateTime<Utc>>>,
    total_readings: AtomicU64,
    total_anomalies: AtomicU64,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: broadcast::Sender<()>,
}

/// Owns the sensor registry, the anomaly aggregator and the alert store,
/// and drives them from a single background worker
pub struct MonitoringLoop {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl MonitoringLoop {
    pub fn builder() -> MonitoringLoopBuilder {
        MonitoringLoopBuilder::new()
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &Arc<SensorRegistry> {
        &self.shared.registry
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start monitoring. Starting a running loop is a no-op.
    ///
    /// With `auto_start` the worker task is spawned, so this must be called
    /// from within a Tokio runtime. Without it the loop is only marked as
    /// running and is driven by `simulate_step()`.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("Monitoring loop is already running");
            return;
        }

        *self
            .shared
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        if self.shared.config.auto_start {
            let (shutdown, shutdown_rx) = broadcast::channel(1);
            let handle = tokio::spawn(run_worker(Arc::clone(&self.shared), shutdown_rx));
            *self.worker.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(Worker { handle, shutdown });
        }

        self.shared
            .logger
            .log_startup(env!("CARGO_PKG_VERSION"), self.shared.registry.len());
    }

    /// Stop monitoring and wait, up to `stop_timeout`, for the worker to exit.
    ///
    /// A worker that does not finish in time is left to wind down on its
    /// own. Stopping a stopped loop is a no-op.
    pub async fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            warn!("Monitoring loop is not running");
            return;
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            // Err only when the worker already exited
            let _ = worker.shutdown.send(());

            match tokio::time::timeout(self.shared.config.stop_timeout, worker.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Monitoring worker ended abnormally"),
                Err(_) => warn!(
                    timeout_secs = self.shared.config.stop_timeout.as_secs_f64(),
                    "Monitoring worker did not stop in time, continuing without it"
                ),
            }
        }

        self.shared.logger.log_shutdown("stop requested");
    }

    /// Run one sampling pass followed by one detection pass, outside the
    /// periodic cadence
    pub async fn simulate_step(&self) -> Result<Vec<Anomaly>> {
        if !self.is_running() {
            *self
                .shared
                .start_time
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        }

        self.shared.collect().await;
        self.shared.run_detection().await
    }

    pub fn status(&self) -> MonitoringStatus {
        let start_time = *self
            .shared
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        MonitoringStatus {
            is_running: self.is_running(),
            start_time,
            runtime_seconds: start_time
                .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0),
            total_readings: self.shared.total_readings.load(Ordering::Relaxed),
            total_anomalies: self.shared.total_anomalies.load(Ordering::Relaxed),
            building_name: self.shared.building_name.clone(),
            sensor_count: self.shared.registry.len(),
            zone_count: self.shared.registry.zone_count(),
            recent_alerts_count: self.shared.alerts.recent(24).len(),
        }
    }

    /// Snapshots taken within the last `hours`, oldest first
    pub async fn recent_readings(&self, hours: i64) -> Vec<ReadingSnapshot> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        self.shared
            .history
            .read()
            .await
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Alerts raised within the last `hours`, oldest first
    pub fn recent_alerts(&self, hours: i64) -> Vec<Alert> {
        self.shared.alerts.recent(hours)
    }

    pub async fn anomaly_summary(&self, hours: i64) -> AnomalySummary {
        self.shared.aggregator.read().await.summary(hours)
    }

    /// `None` when the sensor is not registered
    pub async fn sensor_statistics(&self, sensor_id: &str, hours: i64) -> Option<SensorStatistics> {
        let sensor = self.shared.registry.get(sensor_id)?;
        let statistics = self
            .shared
            .aggregator
            .read()
            .await
            .sensor_statistics(sensor_id, hours);

        Some(SensorStatistics {
            sensor_info: sensor.info().clone(),
            is_active: sensor.is_active(),
            statistics,
        })
    }

    pub async fn dashboard(&self) -> DashboardData {
        let alerts = self.recent_alerts(24);
        let total = self.shared.registry.len();
        let active = self.shared.registry.active_count();
        let count_at = |severity: Severity| alerts.iter().filter(|a| a.severity == severity).count();

        DashboardData {
            timestamp: Utc::now(),
            building: BuildingOverview {
                name: self.shared.building_name.clone(),
                zones: self.shared.registry.zone_count(),
            },
            sensors: SensorHealth {
                total,
                active,
                health_percentage: if total > 0 {
                    active as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            },
            alerts: AlertOverview {
                total_24h: alerts.len(),
                critical: count_at(Severity::Critical),
                high: count_at(Severity::High),
                recent: alerts.iter().rev().take(DASHBOARD_RECENT_ALERTS).cloned().collect(),
            },
            monitoring: self.status(),
            anomaly_summary: self.anomaly_summary(24).await,
        }
    }

    /// Drop reading snapshots, alerts and stored anomalies.
    /// Counters and reading windows are kept.
    pub async fn clear_history(&self) {
        self.shared.history.write().await.clear();
        self.shared.alerts.clear();
        self.shared.aggregator.write().await.clear_anomalies();
        info!("Cleared all history data");
    }

    pub fn add_sensor(&self, sensor: Arc<dyn SensorSource>) {
        let sensor_id = sensor.info().sensor_id.clone();
        self.shared.registry.register(sensor);
        self.shared
            .metrics
            .set_sensors_monitored(self.shared.registry.len() as i64);
        info!(sensor_id = %sensor_id, "Added sensor to monitoring");
    }

    /// Unregister a sensor and drop its reading window
    pub async fn remove_sensor(&self, sensor_id: &str) -> bool {
        if self.shared.registry.unregister(sensor_id).is_none() {
            return false;
        }
        self.shared.aggregator.write().await.remove_sensor(sensor_id);
        self.shared
            .metrics
            .set_sensors_monitored(self.shared.registry.len() as i64);
        info!(sensor_id = %sensor_id, "Removed sensor from monitoring");
        true
    }

    /// Build the export document; `hours` limits readings and alerts to
    /// that trailing window
    pub async fn export_snapshot(&self, hours: Option<i64>) -> ExportSnapshot {
        let (readings, alerts) = match hours {
            Some(hours) => (self.recent_readings(hours).await, self.recent_alerts(hours)),
            None => (
                self.shared.history.read().await.iter().cloned().collect(),
                self.shared.alerts.alerts(),
            ),
        };

        ExportSnapshot {
            export_timestamp: Utc::now(),
            monitoring_status: self.status(),
            readings,
            alerts,
            sensor_summary: self
                .shared
                .registry
                .infos()
                .into_iter()
                .map(|info| (info.sensor_id.clone(), info))
                .collect(),
        }
    }

    pub async fn export(&self, path: &Path, hours: Option<i64>) -> Result<(), ExportError> {
        self.export_snapshot(hours).await.write_json(path)
    }
}

impl Shared {
    /// Sample every active sensor once and record the results
    async fn collect(&self) {
        let started = Instant::now();
        let timestamp = Utc::now();
        let sensors = self.registry.list();

        let mut summary = StateSummary {
            total_sensors: sensors.len(),
            ..Default::default()
        };
        let mut entries = BTreeMap::new();
        let mut collected: Vec<(String, Reading)> = Vec::new();

        for sensor in &sensors {
            if !sensor.is_active() {
                continue;
            }
            summary.active_sensors += 1;
            let info = sensor.info();

            match sensor.take_reading().await {
                Ok(reading) => {
                    entries.insert(
                        info.sensor_id.clone(),
                        SnapshotEntry::Reading {
                            value: reading.value,
                            unit: reading.unit,
                            quality: reading.quality,
                            sensor_type: info.sensor_type.clone(),
                            zone_id: info.zone_id.clone(),
                        },
                    );
                    collected.push((
                        info.sensor_id.clone(),
                        Reading {
                            timestamp,
                            value: reading.value,
                            sensor_type: info.sensor_type.clone(),
                            zone_id: info.zone_id.clone(),
                            metadata: reading.metadata,
                        },
                    ));
                }
                Err(e) => {
                    summary.failed_readings += 1;
                    self.metrics.inc_sensor_read_errors();
                    self.logger.log_sensor_failure(&info.sensor_id, &e.to_string());
                    entries.insert(
                        info.sensor_id.clone(),
                        SnapshotEntry::Error {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        let count = collected.len() as u64;
        {
            let mut aggregator = self.aggregator.write().await;
            for (sensor_id, reading) in collected {
                aggregator.add_reading(&sensor_id, reading);
            }
        }
        self.total_readings.fetch_add(count, Ordering::Relaxed);

        self.metrics.add_readings(count);
        self.metrics.set_sensors_monitored(sensors.len() as i64);
        self.metrics
            .observe_sampling_latency(started.elapsed().as_secs_f64());

        debug!(
            readings = count,
            failed = summary.failed_readings,
            elapsed_ms = started.elapsed().as_millis(),
            "Sampling pass complete"
        );

        if self.config.save_history {
            let mut history = self.history.write().await;
            history.push_back(ReadingSnapshot {
                timestamp,
                readings: entries,
                building_summary: summary,
            });
            while history.len() > self.config.max_history_size {
                history.pop_front();
            }
        }
    }

    /// Refresh the network graph, detect, prune expired anomalies and raise alerts.
    ///
    /// Detection runs on the blocking pool; a panic inside it surfaces here
    /// as an error.
    async fn run_detection(self: &Arc<Self>) -> Result<Vec<Anomaly>> {
        let started = Instant::now();
        let retention = chrono::Duration::from_std(self.config.anomaly_retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(1));

        let shared = Arc::clone(self);
        let (anomalies, pruned) = tokio::task::spawn_blocking(move || {
            let mut aggregator = shared.aggregator.blocking_write();
            aggregator.update_network_graph(shared.registry.as_ref());
            let anomalies = aggregator.detect(None);
            let pruned = aggregator.prune(retention);
            (anomalies, pruned)
        })
        .await
        .context("anomaly detection task failed")?;

        self.total_anomalies
            .fetch_add(anomalies.len() as u64, Ordering::Relaxed);
        self.metrics.add_anomalies(anomalies.len() as u64);

        let alerts = if self.config.enable_alerts && !anomalies.is_empty() {
            self.alerts.process(&anomalies)
        } else {
            Vec::new()
        };
        self.metrics.add_alerts(alerts.len() as u64);

        let elapsed = started.elapsed();
        self.metrics.observe_detection_latency(elapsed.as_secs_f64());
        self.logger.log_detection_cycle(
            self.registry.len(),
            anomalies.len(),
            alerts.len(),
            pruned,
            elapsed.as_millis(),
        );

        Ok(anomalies)
    }

    /// One worker iteration: sample, then detect if the check interval elapsed
    async fn iterate(self: &Arc<Self>, last_detection: &mut Instant) -> Result<()> {
        self.collect().await;

        if last_detection.elapsed() >= self.config.anomaly_check_interval {
            *last_detection = Instant::now();
            self.run_detection().await?;
        }

        Ok(())
    }
}

async fn run_worker(shared: Arc<Shared>, mut shutdown: broadcast::Receiver<()>) {
    info!(
        sampling_interval_secs = shared.config.sampling_interval.as_secs_f64(),
        anomaly_check_interval_secs = shared.config.anomaly_check_interval.as_secs_f64(),
        "Starting monitoring loop"
    );

    let mut last_detection = Instant::now();

    loop {
        let iteration_start = Instant::now();

        let deadline = match shared.iterate(&mut last_detection).await {
            Ok(()) => iteration_start + shared.config.sampling_interval,
            Err(e) => {
                shared.metrics.inc_loop_errors();
                shared
                    .logger
                    .log_loop_error(&e, shared.config.error_backoff.as_secs_f64());
                Instant::now() + shared.config.error_backoff
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("Shutting down monitoring loop");
                break;
            }
            _ = sleep_until(deadline) => {}
        }
    }
}

/// Builder for the monitoring loop
pub struct MonitoringLoopBuilder {
    config: MonitoringConfig,
    registry: Option<Arc<SensorRegistry>>,
    building_name: String,
    node_name: String,
}

impl Default for MonitoringLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitoringLoopBuilder {
    pub fn new() -> Self {
        Self {
            config: MonitoringConfig::default(),
            registry: None,
            building_name: "building".to_string(),
            node_name: "localhost".to_string(),
        }
    }

    pub fn config(mut self, config: MonitoringConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: Arc<SensorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn building_name(mut self, name: impl Into<String>) -> Self {
        self.building_name = name.into();
        self
    }

    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    /// Validate the configuration and assemble the loop (not started)
    pub fn build(self) -> Result<MonitoringLoop> {
        self.config
            .validate()
            .context("invalid monitoring configuration")?;

        let registry = self
            .registry
            .ok_or_else(|| anyhow!("Sensor registry is required"))?;
        registry.set_distance_threshold(self.config.detector.network_distance_threshold);
        let aggregator = AnomalyAggregator::new(self.config.detector.clone())?;
        let alerts = AlertProcessor::new(self.config.alert_threshold, self.config.max_history_size);

        Ok(MonitoringLoop {
            shared: Arc::new(Shared {
                config: self.config,
                registry,
                aggregator: RwLock::new(aggregator),
                alerts,
                history: RwLock::new(VecDeque::new()),
                building_name: self.building_name,
                running: AtomicBool::new(false),
                start_time: Mutex::new(None),
                total_readings: AtomicU64::new(0),
                total_anomalies: AtomicU64::new(0),
                metrics: MonitorMetrics::new(),
                logger: StructuredLogger::new(self.node_name),
            }),
            worker: Mutex::new(None),
        })
    }
}
