//! Anomaly detection for building sensor streams
//!
//! This module provides:
//! - Per-sensor sliding windows of readings
//! - Isolation forest outlier scoring
//! - Rule-based checks (energy spikes, hour-of-day deviation,
//!   correlation breakdown, network isolation)
//! - Aggregation of findings and severity-filtered alerting

mod alerter;
mod buffer;
mod correlation_detector;
mod detector;
mod isolation_forest;
mod network_detector;
mod rules;
mod spike_detector;
pub mod stats;
mod temporal_detector;

pub use alerter::AlertProcessor;
pub use buffer::ReadingBuffer;
pub use correlation_detector::{align_readings, CorrelationRule, ALIGNMENT_TOLERANCE_SECS};
pub use detector::{AnomalyAggregator, AnomalySummary, WindowStatistics};
pub use isolation_forest::{
    average_path_length, severity_from_confidence, ForestConfig, IsolationForest, OutlierScore,
    OutlierScorer, CONFIDENCE_NORMALIZER,
};
pub use network_detector::NetworkIsolationRule;
pub use rules::{DetectionRule, RuleContext, RuleEngine};
pub use spike_detector::{is_energy_sensor, EnergySpikeRule, SpikeStats, ENERGY_SENSOR_TYPES};
pub use temporal_detector::{TemporalRule, MIN_TEMPORAL_READINGS};
