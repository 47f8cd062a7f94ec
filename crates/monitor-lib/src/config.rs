//! Detector and monitoring-loop configuration
//!
//! Both configs are plain values with defaults matching the documented
//! option table. Invalid values are rejected by `validate()`, which every
//! constructor that accepts a config calls before doing anything else.

use std::time::Duration;

use crate::error::ConfigError;
use crate::models::Severity;

/// Default number of readings kept per sensor
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// Default expected outlier fraction
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Default minimum window length before a sensor is evaluated
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Default z-score for energy spikes
pub const DEFAULT_ENERGY_SPIKE_THRESHOLD: f64 = 2.0;

/// Default distance (metres) under which two sensors are considered adjacent
pub const DEFAULT_NETWORK_DISTANCE: f64 = 20.0;

/// Configuration for the anomaly detectors
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Readings kept per sensor (sliding window)
    pub window_size: usize,
    /// Expected outlier fraction for the isolation forest
    pub contamination: f64,
    /// Minimum readings before any detector looks at a sensor
    pub min_samples_for_detection: usize,
    /// |z| above which an energy spike is reported
    pub energy_spike_threshold: f64,
    /// Whether the graph isolation check runs
    pub network_analysis: bool,
    /// Adjacency radius used when building the sensor network graph
    pub network_distance_threshold: f64,
    /// Seed for the outlier model
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            contamination: DEFAULT_CONTAMINATION,
            min_samples_for_detection: DEFAULT_MIN_SAMPLES,
            energy_spike_threshold: DEFAULT_ENERGY_SPIKE_THRESHOLD,
            network_analysis: true,
            network_distance_threshold: DEFAULT_NETWORK_DISTANCE,
            seed: 42,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.min_samples_for_detection < 2 {
            return Err(ConfigError::MinSamplesTooSmall(self.min_samples_for_detection));
        }
        if self.min_samples_for_detection > self.window_size {
            return Err(ConfigError::MinSamplesExceedsWindow {
                min_samples: self.min_samples_for_detection,
                window_size: self.window_size,
            });
        }
        if !self.contamination.is_finite()
            || self.contamination <= 0.0
            || self.contamination > 0.5
        {
            return Err(ConfigError::InvalidContamination(self.contamination));
        }
        if !self.energy_spike_threshold.is_finite() || self.energy_spike_threshold <= 0.0 {
            return Err(ConfigError::InvalidSpikeThreshold(self.energy_spike_threshold));
        }
        if !self.network_distance_threshold.is_finite() || self.network_distance_threshold < 0.0 {
            return Err(ConfigError::InvalidDistanceThreshold(
                self.network_distance_threshold,
            ));
        }
        Ok(())
    }
}

/// Configuration for the monitoring loop and alerting
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringConfig {
    /// Time between sampling passes (default: 60 seconds)
    pub sampling_interval: Duration,
    /// Minimum time between detection cycles (default: 300 seconds)
    pub anomaly_check_interval: Duration,
    /// Spawn the worker on `start()`; when false the loop is stepped manually
    pub auto_start: bool,
    /// Keep reading snapshots
    pub save_history: bool,
    /// Snapshots retained before the oldest is evicted
    pub max_history_size: usize,
    /// Forward anomalies to the alert processor
    pub enable_alerts: bool,
    /// Lowest severity that raises an alert
    pub alert_threshold: Severity,
    /// Anomalies older than this are pruned after each detection cycle
    pub anomaly_retention: Duration,
    /// How long `stop()` waits for the worker before giving up on it
    pub stop_timeout: Duration,
    /// Pause after a failed iteration
    pub error_backoff: Duration,
    pub detector: DetectorConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(60),
            anomaly_check_interval: Duration::from_secs(300),
            auto_start: true,
            save_history: true,
            max_history_size: 10_000,
            enable_alerts: true,
            alert_threshold: Severity::Medium,
            anomaly_retention: Duration::from_secs(7 * 24 * 60 * 60),
            stop_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            detector: DetectorConfig::default(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_size == 0 {
            return Err(ConfigError::ZeroHistorySize);
        }
        self.detector.validate()
    }
}

/// Convert a seconds value from a config file into a `Duration`, rejecting
/// negative, NaN and infinite values
pub fn duration_from_secs(name: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidInterval { name, value: secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitoringConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.window_size, 50);
        assert_eq!(config.detector.min_samples_for_detection, 20);
        assert_eq!(config.sampling_interval, Duration::from_secs(60));
        assert_eq!(config.anomaly_check_interval, Duration::from_secs(300));
        assert_eq!(config.max_history_size, 10_000);
        assert_eq!(config.alert_threshold, Severity::Medium);
    }

    #[test]
    fn test_rejects_bad_contamination() {
        let config = DetectorConfig {
            contamination: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidContamination(0.0)));

        let config = DetectorConfig {
            contamination: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_min_samples_above_window() {
        let config = DetectorConfig {
            window_size: 10,
            min_samples_for_detection: 20,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MinSamplesExceedsWindow { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_history() {
        let config = MonitoringConfig {
            max_history_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHistorySize));
    }

    #[test]
    fn test_duration_from_secs() {
        assert_eq!(
            duration_from_secs("sampling_interval", 1.5).unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(duration_from_secs("sampling_interval", 0.0).unwrap(), Duration::ZERO);
        assert!(duration_from_secs("sampling_interval", -1.0).is_err());
        assert!(duration_from_secs("sampling_interval", f64::INFINITY).is_err());
    }
}
