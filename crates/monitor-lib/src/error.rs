//! Error types for the monitoring library

use thiserror::Error;

/// Rejected configuration values, reported when a config is constructed or validated
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window_size must be at least 1")]
    ZeroWindowSize,

    #[error("min_samples_for_detection must be at least 2 (got {0})")]
    MinSamplesTooSmall(usize),

    #[error("min_samples_for_detection ({min_samples}) exceeds window_size ({window_size})")]
    MinSamplesExceedsWindow {
        min_samples: usize,
        window_size: usize,
    },

    #[error("contamination must be in (0, 0.5] (got {0})")]
    InvalidContamination(f64),

    #[error("energy_spike_threshold must be a positive number (got {0})")]
    InvalidSpikeThreshold(f64),

    #[error("network_distance_threshold must be a non-negative number (got {0})")]
    InvalidDistanceThreshold(f64),

    #[error("max_history_size must be at least 1")]
    ZeroHistorySize,

    #[error("{name} must be a non-negative number of seconds (got {value})")]
    InvalidInterval { name: &'static str, value: f64 },

    #[error("unknown alert threshold '{0}' (expected low, medium, high or critical)")]
    UnknownSeverity(String),
}

/// Failure reading a single sensor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("sensor {sensor_id} is not active")]
    Inactive { sensor_id: String },

    #[error("sensor {sensor_id} read failed: {reason}")]
    ReadFailed { sensor_id: String, reason: String },
}

/// Failure writing an export document
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize export document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure fitting the outlier model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("cannot fit a model on an empty sample set")]
    EmptyInput,

    #[error("sample {index} has {got} features, expected {expected}")]
    FeatureMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    #[error("sample {index} contains a non-finite value")]
    NonFinite { index: usize },
}
