use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use super::*;
use crate::config::{DetectorConfig, MonitoringConfig};
use crate::error::SensorError;
use crate::export::ExportSnapshot;
use crate::models::{AnomalyType, Metadata, SensorInfo, SensorReading, Severity};

/// Replays a fixed list of values, repeating the last one once exhausted
struct ScriptedSensor {
    info: SensorInfo,
    values: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
    active: AtomicBool,
    failing: AtomicBool,
}

impl ScriptedSensor {
    fn new(id: &str, sensor_type: &str, values: Vec<f64>) -> Arc<Self> {
        Arc::new(Self {
            info: SensorInfo::new(id, sensor_type)
                .with_unit("W")
                .with_zone("zone_a")
                .with_position(0.0, 0.0, 0.0),
            values: Mutex::new(values.into()),
            last: Mutex::new(0.0),
            active: AtomicBool::new(true),
            failing: AtomicBool::new(false),
        })
    }

    fn constant(id: &str, value: f64) -> Arc<Self> {
        Self::new(id, "temperature", vec![value])
    }
}

#[async_trait]
impl SensorSource for ScriptedSensor {
    fn info(&self) -> &SensorInfo {
        &self.info
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn take_reading(&self) -> Result<SensorReading, SensorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SensorError::ReadFailed {
                sensor_id: self.info.sensor_id.clone(),
                reason: "bus timeout".to_string(),
            });
        }

        let mut last = self.last.lock().unwrap();
        if let Some(value) = self.values.lock().unwrap().pop_front() {
            *last = value;
        }

        Ok(SensorReading {
            timestamp: Utc::now(),
            value: *last,
            unit: self.info.unit.clone(),
            quality: 1.0,
            metadata: Metadata::new(),
        })
    }
}

fn manual_config() -> MonitoringConfig {
    MonitoringConfig {
        auto_start: false,
        ..Default::default()
    }
}

fn build(config: MonitoringConfig, sensors: Vec<Arc<ScriptedSensor>>) -> MonitoringLoop {
    let registry = Arc::new(SensorRegistry::new());
    for sensor in sensors {
        registry.register(sensor);
    }
    MonitoringLoop::builder()
        .config(config)
        .registry(registry)
        .building_name("Test Tower")
        .build()
        .unwrap()
}

#[test]
fn test_builder_requires_registry() {
    let result = MonitoringLoop::builder().config(manual_config()).build();
    assert!(result.is_err());
}

#[test]
fn test_builder_rejects_invalid_config() {
    let config = MonitoringConfig {
        max_history_size: 0,
        ..Default::default()
    };
    let result = MonitoringLoop::builder()
        .config(config)
        .registry(Arc::new(SensorRegistry::new()))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_builder_applies_network_distance_threshold() {
    let config = MonitoringConfig {
        detector: DetectorConfig {
            network_distance_threshold: 75.0,
            ..Default::default()
        },
        ..manual_config()
    };
    let monitor = build(config, Vec::new());
    assert_eq!(monitor.registry().distance_threshold(), 75.0);
}

#[tokio::test]
async fn test_simulate_step_counts_active_sensors_only() {
    let inactive = ScriptedSensor::constant("temp_c", 21.0);
    inactive.active.store(false, Ordering::SeqCst);
    let monitor = build(
        manual_config(),
        vec![
            ScriptedSensor::constant("temp_a", 21.0),
            ScriptedSensor::constant("temp_b", 22.0),
            inactive,
        ],
    );

    let mut previous = 0;
    for _ in 0..3 {
        monitor.simulate_step().await.unwrap();
        let total = monitor.status().total_readings;
        assert!(total > previous);
        previous = total;
    }

    let status = monitor.status();
    assert_eq!(status.total_readings, 6);
    assert_eq!(status.sensor_count, 3);
    assert_eq!(status.building_name, "Test Tower");
    assert!(!status.is_running);
    assert!(status.start_time.is_some());

    let history = monitor.recent_readings(1).await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|s| s.readings.len() == 2));
    assert!(history.iter().all(|s| s.building_summary.total_sensors == 3));
}

#[tokio::test]
async fn test_failed_reads_become_error_entries() {
    let broken = ScriptedSensor::constant("temp_broken", 0.0);
    broken.failing.store(true, Ordering::SeqCst);
    let monitor = build(
        manual_config(),
        vec![ScriptedSensor::constant("temp_ok", 20.0), broken],
    );

    monitor.simulate_step().await.unwrap();

    assert_eq!(monitor.status().total_readings, 1);
    let snapshot = &monitor.recent_readings(1).await[0];
    assert_eq!(snapshot.building_summary.failed_readings, 1);
    assert_eq!(snapshot.building_summary.active_sensors, 2);
    assert!(snapshot.readings["temp_broken"].is_error());
    assert!(!snapshot.readings["temp_ok"].is_error());
}

#[tokio::test]
async fn test_history_is_bounded() {
    let config = MonitoringConfig {
        max_history_size: 2,
        ..manual_config()
    };
    let monitor = build(config, vec![ScriptedSensor::constant("temp_a", 21.0)]);

    for _ in 0..5 {
        monitor.simulate_step().await.unwrap();
    }

    assert_eq!(monitor.recent_readings(1).await.len(), 2);
    assert_eq!(monitor.status().total_readings, 5);
}

#[tokio::test]
async fn test_energy_spike_raises_alert() {
    let config = MonitoringConfig {
        detector: DetectorConfig {
            min_samples_for_detection: 15,
            ..Default::default()
        },
        ..manual_config()
    };
    let mut values: Vec<f64> = (0..9).map(|i| if i % 2 == 0 { 99.0 } else { 101.0 }).collect();
    values.extend(std::iter::repeat(500.0).take(10));
    let monitor = build(
        config,
        vec![ScriptedSensor::new("meter_main", "energy_power", values)],
    );

    let mut detected = Vec::new();
    for _ in 0..19 {
        detected.extend(monitor.simulate_step().await.unwrap());
    }

    assert!(detected
        .iter()
        .any(|a| a.sensor_id == "meter_main" && a.anomaly_type == AnomalyType::EnergySpike));

    let alerts = monitor.recent_alerts(1);
    assert!(!alerts.is_empty());
    assert!(alerts.iter().all(|a| a.severity >= Severity::Medium));

    let status = monitor.status();
    assert_eq!(status.total_anomalies, detected.len() as u64);
    assert_eq!(status.recent_alerts_count, alerts.len());

    let dashboard = monitor.dashboard().await;
    assert_eq!(dashboard.building.name, "Test Tower");
    assert_eq!(dashboard.sensors.total, 1);
    assert_eq!(dashboard.sensors.health_percentage, 100.0);
    assert!(dashboard.alerts.recent.len() <= 5);
    assert!(dashboard.anomaly_summary.total_anomalies > 0);
}

#[tokio::test]
async fn test_clear_history_keeps_counters() {
    let monitor = build(manual_config(), vec![ScriptedSensor::constant("temp_a", 21.0)]);
    monitor.simulate_step().await.unwrap();
    monitor.simulate_step().await.unwrap();

    monitor.clear_history().await;

    assert!(monitor.recent_readings(24).await.is_empty());
    assert!(monitor.recent_alerts(24).is_empty());
    assert_eq!(monitor.anomaly_summary(24).await.total_anomalies, 0);
    assert_eq!(monitor.status().total_readings, 2);

    // Reading windows survive a clear
    let stats = monitor.sensor_statistics("temp_a", 24).await.unwrap();
    assert_eq!(stats.statistics.unwrap().count, 2);
}

#[tokio::test]
async fn test_sensor_statistics_unknown_sensor() {
    let monitor = build(manual_config(), vec![ScriptedSensor::constant("temp_a", 21.0)]);
    assert!(monitor.sensor_statistics("missing", 24).await.is_none());

    let stats = monitor.sensor_statistics("temp_a", 24).await.unwrap();
    assert!(stats.is_active);
    assert!(stats.statistics.is_none());
}

#[tokio::test]
async fn test_add_and_remove_sensor() {
    let monitor = build(manual_config(), vec![]);
    monitor.add_sensor(ScriptedSensor::constant("temp_new", 18.0));
    assert_eq!(monitor.status().sensor_count, 1);

    monitor.simulate_step().await.unwrap();
    assert!(monitor.remove_sensor("temp_new").await);
    assert!(!monitor.remove_sensor("temp_new").await);
    assert_eq!(monitor.status().sensor_count, 0);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let monitor = build(manual_config(), vec![ScriptedSensor::constant("temp_a", 21.0)]);

    monitor.start();
    let first_start = monitor.status().start_time;
    monitor.start();
    assert!(monitor.is_running());
    assert_eq!(monitor.status().start_time, first_start);

    monitor.stop().await;
    assert!(!monitor.is_running());
    monitor.stop().await;
    assert!(!monitor.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_samples_until_stopped() {
    let config = MonitoringConfig {
        sampling_interval: Duration::from_millis(20),
        anomaly_check_interval: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let monitor = build(config, vec![ScriptedSensor::constant("temp_a", 21.0)]);

    monitor.start();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    monitor.stop().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!monitor.is_running());

    let sampled = monitor.status().total_readings;
    assert!(sampled >= 2);

    // No sampling after stop
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.status().total_readings, sampled);
}

#[tokio::test]
async fn test_export_round_trip() {
    let monitor = build(
        manual_config(),
        vec![
            ScriptedSensor::constant("temp_a", 21.0),
            ScriptedSensor::constant("temp_b", 22.0),
        ],
    );
    monitor.simulate_step().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.json");
    monitor.export(&path, Some(24)).await.unwrap();

    let exported = ExportSnapshot::read_json(&path).unwrap();
    assert_eq!(exported.readings.len(), 1);
    assert_eq!(exported.sensor_summary.len(), 2);
    assert!(exported.sensor_summary.contains_key("temp_b"));
    assert_eq!(exported.monitoring_status.total_readings, 2);
    assert_eq!(exported.monitoring_status.building_name, "Test Tower");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for key in ["export_timestamp", "monitoring_status", "readings", "alerts", "sensor_summary"] {
        assert!(raw.get(key).is_some(), "missing {}", key);
    }
}
