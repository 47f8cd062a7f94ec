//! Daemon configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use monitor_lib::config::{duration_from_secs, DetectorConfig, MonitoringConfig};
use monitor_lib::ConfigError;
use serde::Deserialize;

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_building_name")]
    pub building_name: String,

    /// Number of zones in the simulated building
    #[serde(default = "default_demo_zones")]
    pub demo_zones: usize,

    /// Probability that a simulated read fails
    #[serde(default)]
    pub failure_probability: f64,

    #[serde(default = "default_simulation_seed")]
    pub simulation_seed: u64,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_contamination")]
    pub contamination: f64,

    #[serde(default = "default_min_samples")]
    pub min_samples_for_detection: usize,

    #[serde(default = "default_energy_spike_threshold")]
    pub energy_spike_threshold: f64,

    #[serde(default = "default_network_distance_threshold")]
    pub network_distance_threshold: f64,

    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_secs: f64,

    #[serde(default = "default_anomaly_check_interval")]
    pub anomaly_check_interval_secs: f64,

    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Lowest severity that raises an alert
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: String,

    #[serde(default = "default_true")]
    pub enable_alerts: bool,

    #[serde(default = "default_true")]
    pub save_history: bool,

    #[serde(default = "default_anomaly_retention_days")]
    pub anomaly_retention_days: f64,

    /// Write an export document here on shutdown
    #[serde(default)]
    pub export_on_shutdown: Option<PathBuf>,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_building_name() -> String {
    "Demo Office Building".to_string()
}

fn default_demo_zones() -> usize {
    4
}

fn default_simulation_seed() -> u64 {
    42
}

fn default_window_size() -> usize {
    monitor_lib::config::DEFAULT_WINDOW_SIZE
}

fn default_contamination() -> f64 {
    monitor_lib::config::DEFAULT_CONTAMINATION
}

fn default_min_samples() -> usize {
    monitor_lib::config::DEFAULT_MIN_SAMPLES
}

fn default_energy_spike_threshold() -> f64 {
    monitor_lib::config::DEFAULT_ENERGY_SPIKE_THRESHOLD
}

fn default_network_distance_threshold() -> f64 {
    monitor_lib::config::DEFAULT_NETWORK_DISTANCE
}

fn default_sampling_interval() -> f64 {
    60.0
}

fn default_anomaly_check_interval() -> f64 {
    300.0
}

fn default_max_history_size() -> usize {
    10_000
}

fn default_alert_threshold() -> String {
    "medium".to_string()
}

fn default_true() -> bool {
    true
}

fn default_anomaly_retention_days() -> f64 {
    7.0
}

impl AgentConfig {
    /// Load configuration from the optional config file, overridden by
    /// `MONITOR_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var("MONITOR_CONFIG").unwrap_or_else(|_| "monitor.toml".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("MONITOR").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration (file: {})", path))?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("failed to parse configuration")
    }

    /// Convert into the library's monitoring configuration, validating every value
    pub fn monitoring_config(&self) -> Result<MonitoringConfig, ConfigError> {
        let config = MonitoringConfig {
            sampling_interval: duration_from_secs("sampling_interval_secs", self.sampling_interval_secs)?,
            anomaly_check_interval: duration_from_secs(
                "anomaly_check_interval_secs",
                self.anomaly_check_interval_secs,
            )?,
            save_history: self.save_history,
            max_history_size: self.max_history_size,
            enable_alerts: self.enable_alerts,
            alert_threshold: self.alert_threshold.parse()?,
            anomaly_retention: duration_from_secs(
                "anomaly_retention_days",
                self.anomaly_retention_days * SECONDS_PER_DAY,
            )?,
            detector: DetectorConfig {
                window_size: self.window_size,
                contamination: self.contamination,
                min_samples_for_detection: self.min_samples_for_detection,
                energy_spike_threshold: self.energy_spike_threshold,
                network_distance_threshold: self.network_distance_threshold,
                seed: self.simulation_seed,
                ..Default::default()
            },
            ..Default::default()
        };

        config.validate()?;
        Ok(config)
    }
}
