//! Anomaly aggregation
//!
//! Owns the per-sensor reading windows and the anomaly store. A detection
//! pass runs the outlier scorer and every per-sensor rule for each eligible
//! sensor, then the isolation check once over the network graph.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::buffer::ReadingBuffer;
use super::isolation_forest::OutlierScorer;
use super::rules::{RuleContext, RuleEngine};
use super::stats;
use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::graph::{GraphProvider, NetworkGraph};
use crate::models::{Anomaly, AnomalyType, Reading, Severity};

/// Counts over a trailing window of the anomaly store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_anomalies: usize,
    /// Every severity is present, zero when unseen
    pub by_severity: BTreeMap<String, usize>,
    /// Every anomaly type is present, zero when unseen
    pub by_type: BTreeMap<String, usize>,
    pub most_recent: Option<DateTime<Utc>>,
    /// Sorted, deduplicated ids with at least one critical anomaly
    pub critical_sensors: Vec<String>,
}

/// Descriptive statistics of one sensor's buffered readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatistics {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub current: f64,
    pub recent_anomalies: usize,
    pub last_anomaly: Option<DateTime<Utc>>,
}

pub struct AnomalyAggregator {
    config: DetectorConfig,
    buffers: BTreeMap<String, ReadingBuffer>,
    scorer: OutlierScorer,
    rules: RuleEngine,
    graph: Option<NetworkGraph>,
    anomalies: Vec<Anomaly>,
}

impl AnomalyAggregator {
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scorer: OutlierScorer::new(&config),
            rules: RuleEngine::new(&config),
            config,
            buffers: BTreeMap::new(),
            graph: None,
            anomalies: Vec::new(),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Append a reading to the sensor's window, creating the window on first use
    pub fn add_reading(&mut self, sensor_id: &str, reading: Reading) {
        let window_size = self.config.window_size;
        self.buffers
            .entry(sensor_id.to_string())
            .or_insert_with(|| ReadingBuffer::new(window_size))
            .add(reading);
    }

    pub fn buffer(&self, sensor_id: &str) -> Option<&ReadingBuffer> {
        self.buffers.get(sensor_id)
    }

    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Drop a sensor's window. Stored anomalies are kept.
    pub fn remove_sensor(&mut self, sensor_id: &str) -> bool {
        self.buffers.remove(sensor_id).is_some()
    }

    /// Refresh the graph snapshot from a provider
    pub fn update_network_graph(&mut self, provider: &dyn GraphProvider) {
        self.graph = provider.sensor_network_graph();
        debug!(
            nodes = self.graph.as_ref().map_or(0, NetworkGraph::node_count),
            "Updated sensor network graph"
        );
    }

    pub fn set_network_graph(&mut self, graph: Option<NetworkGraph>) {
        self.graph = graph;
    }

    pub fn network_graph(&self) -> Option<&NetworkGraph> {
        self.graph.as_ref()
    }

    /// Run detection over the given sensors (all known sensors when `None`).
    ///
    /// Sensors with fewer than `min_samples_for_detection` readings and
    /// unknown ids are skipped. Findings are appended to the store and
    /// returned ordered by severity, then timestamp, both descending.
    pub fn detect(&mut self, sensor_ids: Option<&[String]>) -> Vec<Anomaly> {
        let targets: Vec<String> = match sensor_ids {
            Some(ids) => ids.to_vec(),
            None => self.buffers.keys().cloned().collect(),
        };

        let mut detected = Vec::new();
        for sensor_id in &targets {
            let Some(buffer) = self.buffers.get(sensor_id) else {
                continue;
            };
            if buffer.len() < self.config.min_samples_for_detection {
                continue;
            }

            detected.extend(self.scorer.detect(sensor_id, buffer.all()));
            detected.extend(self.rules.evaluate_sensor(&RuleContext {
                sensor_id,
                readings: buffer.all(),
                buffers: &self.buffers,
            }));
        }

        if self.config.network_analysis {
            if let Some(graph) = &self.graph {
                detected.extend(self.rules.evaluate_network(graph, &self.buffers));
            }
        }

        self.anomalies.extend(detected.iter().cloned());

        detected.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        debug!(
            sensors = targets.len(),
            anomalies = detected.len(),
            "Detection pass complete"
        );
        detected
    }

    /// Every stored anomaly, in insertion order
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    pub fn summary(&self, hours: i64) -> AnomalySummary {
        self.summary_at(Utc::now(), hours)
    }

    /// Summary of anomalies with a timestamp at or after `now - hours`
    pub fn summary_at(&self, now: DateTime<Utc>, hours: i64) -> AnomalySummary {
        let cutoff = now - Duration::hours(hours);
        let recent: Vec<&Anomaly> = self
            .anomalies
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .collect();

        let mut by_severity: BTreeMap<String, usize> =
            Severity::ALL.iter().map(|s| (s.to_string(), 0)).collect();
        let mut by_type: BTreeMap<String, usize> =
            AnomalyType::ALL.iter().map(|t| (t.to_string(), 0)).collect();

        for anomaly in &recent {
            *by_severity.entry(anomaly.severity.to_string()).or_default() += 1;
            *by_type.entry(anomaly.anomaly_type.to_string()).or_default() += 1;
        }

        let critical_sensors: BTreeSet<String> = recent
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .map(|a| a.sensor_id.clone())
            .collect();

        AnomalySummary {
            total_anomalies: recent.len(),
            by_severity,
            by_type,
            most_recent: recent.iter().map(|a| a.timestamp).max(),
            critical_sensors: critical_sensors.into_iter().collect(),
        }
    }

    /// Remove anomalies older than `max_age`; returns how many were removed
    pub fn prune(&mut self, max_age: Duration) -> usize {
        self.prune_before(Utc::now() - max_age)
    }

    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.anomalies.len();
        self.anomalies.retain(|a| a.timestamp >= cutoff);
        let removed = before - self.anomalies.len();
        if removed > 0 {
            info!(removed, "Pruned old anomalies");
        }
        removed
    }

    /// Statistics over the sensor's buffered readings newer than `hours`
    pub fn sensor_statistics(&self, sensor_id: &str, hours: i64) -> Option<WindowStatistics> {
        self.sensor_statistics_at(Utc::now(), sensor_id, hours)
    }

    pub fn sensor_statistics_at(
        &self,
        now: DateTime<Utc>,
        sensor_id: &str,
        hours: i64,
    ) -> Option<WindowStatistics> {
        let cutoff = now - Duration::hours(hours);
        let values: Vec<f64> = self
            .buffers
            .get(sensor_id)?
            .all()
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .map(|r| r.value)
            .collect();

        let current = *values.last()?;
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let recent: Vec<&Anomaly> = self
            .anomalies
            .iter()
            .filter(|a| a.sensor_id == sensor_id && a.timestamp >= cutoff)
            .collect();

        Some(WindowStatistics {
            count: values.len(),
            mean: stats::mean(&values)?,
            std: stats::population_std(&values)?,
            min: *sorted.first()?,
            max: *sorted.last()?,
            median: stats::percentile(&sorted, 50.0)?,
            current,
            recent_anomalies: recent.len(),
            last_anomaly: recent.last().map(|a| a.timestamp),
        })
    }

    /// Forget stored anomalies; reading windows are kept
    pub fn clear_anomalies(&mut self) {
        self.anomalies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorInfo;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 8, 10, 0, 0).unwrap()
    }

    fn anomaly(sensor_id: &str, severity: Severity, anomaly_type: AnomalyType, minutes: i64) -> Anomaly {
        Anomaly {
            sensor_id: sensor_id.to_string(),
            anomaly_type,
            severity,
            confidence: 0.9,
            timestamp: base() + Duration::minutes(minutes),
            value: 1.0,
            expected_range: (0.0, 2.0),
            description: String::new(),
            recommendations: Vec::new(),
            metadata: Default::default(),
        }
    }

    fn feed(aggregator: &mut AnomalyAggregator, sensor_id: &str, sensor_type: &str, values: &[f64]) {
        for (i, v) in values.iter().enumerate() {
            let ts = base() + Duration::minutes(i as i64);
            aggregator.add_reading(sensor_id, Reading::new(ts, *v, sensor_type));
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = DetectorConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(AnomalyAggregator::new(config).is_err());
    }

    #[test]
    fn test_energy_spike_end_to_end() {
        // 9x100 then 10x500 never fires: flat history has std 0 and 19 readings sit under the default minimum of 20
        let config = DetectorConfig {
            min_samples_for_detection: 15,
            ..Default::default()
        };
        let mut aggregator = AnomalyAggregator::new(config).unwrap();

        let mut values: Vec<f64> = (0..9).map(|i| if i % 2 == 0 { 99.0 } else { 101.0 }).collect();
        values.extend(std::iter::repeat(500.0).take(10));
        feed(&mut aggregator, "meter_main", "energy_power", &values);

        let anomalies = aggregator.detect(None);
        assert!(anomalies.iter().any(|a| a.sensor_id == "meter_main"
            && a.anomaly_type == AnomalyType::EnergySpike
            && a.severity == Severity::High));
        assert_eq!(aggregator.anomalies().len(), anomalies.len());
    }

    #[test]
    fn test_short_windows_are_never_reported() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        let mut values = vec![100.0; 9];
        values.extend(std::iter::repeat(500.0).take(10));
        feed(&mut aggregator, "meter_main", "energy_power", &values);

        // Isolated in the graph, but only 19 readings
        let sensors = vec![SensorInfo::new("meter_main", "energy_power")];
        aggregator.set_network_graph(Some(NetworkGraph::from_sensors(&sensors, 20.0)));

        assert!(aggregator.detect(None).is_empty());
        assert!(aggregator
            .detect(Some(&["meter_main".to_string(), "missing".to_string()]))
            .is_empty());
    }

    #[test]
    fn test_network_check_runs_once_per_pass() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        feed(&mut aggregator, "roof", "occupancy_count", &[3.0; 25]);
        let sensors = vec![SensorInfo::new("roof", "occupancy_count")];
        aggregator.set_network_graph(Some(NetworkGraph::from_sensors(&sensors, 20.0)));

        let anomalies = aggregator.detect(None);
        let isolation: Vec<_> = anomalies
            .iter()
            .filter(|a| a.anomaly_type == AnomalyType::NetworkIsolation)
            .collect();
        assert_eq!(isolation.len(), 1);
        assert_eq!(isolation[0].severity, Severity::High);

        // Disabled analysis skips the graph entirely
        let config = DetectorConfig {
            network_analysis: false,
            ..Default::default()
        };
        let mut aggregator = AnomalyAggregator::new(config).unwrap();
        feed(&mut aggregator, "roof", "occupancy_count", &[3.0; 25]);
        aggregator.set_network_graph(Some(NetworkGraph::from_sensors(&sensors, 20.0)));
        assert!(aggregator.detect(None).is_empty());
    }

    #[test]
    fn test_detect_orders_by_severity_then_time() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        feed(&mut aggregator, "a", "occupancy_count", &[3.0; 25]);
        feed(&mut aggregator, "b", "occupancy_count", &[4.0; 25]);
        aggregator.add_reading("b", Reading::new(base() + Duration::hours(1), 4.0, "occupancy_count"));

        let sensors = vec![
            SensorInfo::new("a", "occupancy_count").with_zone("north"),
            SensorInfo::new("b", "occupancy_count")
                .with_zone("south")
                .with_position(100.0, 0.0, 0.0),
        ];
        aggregator.set_network_graph(Some(NetworkGraph::from_sensors(&sensors, 20.0)));

        let anomalies = aggregator.detect(None);
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].sensor_id, "b");
        assert_eq!(anomalies[1].sensor_id, "a");
        assert!(anomalies
            .windows(2)
            .all(|w| (w[0].severity, w[0].timestamp) >= (w[1].severity, w[1].timestamp)));
    }

    #[test]
    fn test_summary_counts_are_consistent() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        aggregator.anomalies = vec![
            anomaly("a", Severity::Critical, AnomalyType::Unknown, 0),
            anomaly("b", Severity::Low, AnomalyType::EnergySpike, 5),
            anomaly("a", Severity::Critical, AnomalyType::NetworkIsolation, 10),
            anomaly("c", Severity::High, AnomalyType::SeasonalDeviation, -60 * 48),
        ];

        let summary = aggregator.summary_at(base() + Duration::hours(1), 24);
        assert_eq!(summary.total_anomalies, 3);
        assert_eq!(summary.by_severity.values().sum::<usize>(), 3);
        assert_eq!(summary.by_type.values().sum::<usize>(), 3);
        assert_eq!(summary.by_severity.len(), 4);
        assert_eq!(summary.by_type.len(), 7);
        assert_eq!(summary.by_severity["high"], 0);
        assert_eq!(summary.critical_sensors, vec!["a".to_string()]);
        assert_eq!(summary.most_recent, Some(base() + Duration::minutes(10)));

        let empty = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        let summary = empty.summary(24);
        assert_eq!(summary.total_anomalies, 0);
        assert_eq!(summary.most_recent, None);
    }

    #[test]
    fn test_prune_removes_old_anomalies() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        aggregator.anomalies = vec![
            anomaly("a", Severity::Low, AnomalyType::Unknown, -60 * 24 * 10),
            anomaly("a", Severity::Low, AnomalyType::Unknown, 0),
        ];

        let removed = aggregator.prune_before(base() - Duration::days(7));
        assert_eq!(removed, 1);
        assert_eq!(aggregator.anomalies().len(), 1);
    }

    #[test]
    fn test_cutoff_boundary_is_inclusive() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        aggregator.anomalies = vec![anomaly("a", Severity::Low, AnomalyType::Unknown, 0)];

        let summary = aggregator.summary_at(base() + Duration::hours(24), 24);
        assert_eq!(summary.total_anomalies, 1);

        assert_eq!(aggregator.prune_before(base()), 0);
        assert_eq!(aggregator.prune_before(base() + Duration::seconds(1)), 1);
    }

    #[test]
    fn test_non_finite_reading_only_affects_its_sensor() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();

        let healthy: Vec<f64> = (0..25)
            .map(|i| if i == 12 { 100.0 } else { 20.0 + (i % 5) as f64 * 0.2 })
            .collect();
        feed(&mut aggregator, "hvac_001", "hvac_temperature", &healthy);

        let mut glitchy: Vec<f64> = (0..24).map(|i| 20.0 + (i % 5) as f64 * 0.2).collect();
        glitchy.push(f64::INFINITY);
        feed(&mut aggregator, "hvac_002", "hvac_temperature", &glitchy);

        let anomalies = aggregator.detect(None);
        assert!(anomalies.iter().any(|a| a.sensor_id == "hvac_001"
            && a.anomaly_type == AnomalyType::Unknown
            && a.value == 100.0));
        assert!(!anomalies
            .iter()
            .any(|a| a.sensor_id == "hvac_002" && a.anomaly_type == AnomalyType::Unknown));
    }

    #[test]
    fn test_sensor_statistics() {
        let mut aggregator = AnomalyAggregator::new(DetectorConfig::default()).unwrap();
        feed(&mut aggregator, "hvac_001", "hvac_temperature", &[20.0, 22.0, 24.0, 18.0]);

        let stats = aggregator
            .sensor_statistics_at(base() + Duration::minutes(10), "hvac_001", 24)
            .unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 21.0);
        assert_eq!(stats.min, 18.0);
        assert_eq!(stats.max, 24.0);
        assert_eq!(stats.median, 21.0);
        assert_eq!(stats.current, 18.0);
        assert_eq!(stats.recent_anomalies, 0);

        assert!(aggregator.sensor_statistics("missing", 24).is_none());
    }
}
