//! Energy spike detection
//!
//! Compares the mean of the most recent readings of an energy sensor
//! against the mean and spread of everything before them. A recent mean
//! that sits more than `threshold` standard deviations away is a spike.

use serde_json::json;

use super::rules::{DetectionRule, RuleContext};
use super::stats;
use crate::models::{Anomaly, AnomalyType, Metadata, Severity};

/// Sensor types the spike rule applies to
pub const ENERGY_SENSOR_TYPES: [&str; 4] = [
    "energy_power",
    "energy_voltage",
    "energy_current",
    "energy_total",
];

/// Number of trailing readings treated as the recent segment
const RECENT_WINDOW: usize = 10;

/// |z| above which a spike is escalated to high severity
const HIGH_SEVERITY_Z: f64 = 3.0;

pub fn is_energy_sensor(sensor_type: &str) -> bool {
    ENERGY_SENSOR_TYPES.contains(&sensor_type)
}

/// Detects sustained shifts in energy readings using a z-score on segment means
#[derive(Debug, Clone)]
pub struct EnergySpikeRule {
    /// Number of standard deviations to consider a spike
    pub threshold: f64,
}

impl EnergySpikeRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Z-score of the recent segment against the historical one.
    ///
    /// `None` when there are not enough values to form both segments or the
    /// historical segment has no spread.
    pub fn z_score(values: &[f64]) -> Option<SpikeStats> {
        if values.len() <= RECENT_WINDOW {
            return None;
        }
        let (historical, recent) = values.split_at(values.len() - RECENT_WINDOW);

        let historical_mean = stats::mean(historical)?;
        let historical_std = stats::population_std(historical)?;
        let recent_mean = stats::mean(recent)?;

        // Avoid division by zero
        if historical_std < f64::EPSILON {
            return None;
        }

        Some(SpikeStats {
            z_score: (recent_mean - historical_mean) / historical_std,
            historical_mean,
            historical_std,
            recent_mean,
        })
    }
}

impl Default for EnergySpikeRule {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ENERGY_SPIKE_THRESHOLD)
    }
}

/// Segment statistics behind a spike decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeStats {
    pub z_score: f64,
    pub historical_mean: f64,
    pub historical_std: f64,
    pub recent_mean: f64,
}

impl DetectionRule for EnergySpikeRule {
    fn name(&self) -> &'static str {
        "energy_spike"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Anomaly> {
        let Some(latest) = ctx.readings.back() else {
            return Vec::new();
        };
        if !is_energy_sensor(&latest.sensor_type) {
            return Vec::new();
        }

        let values: Vec<f64> = ctx.readings.iter().map(|r| r.value).collect();
        let Some(spike) = Self::z_score(&values) else {
            return Vec::new();
        };

        let magnitude = spike.z_score.abs();
        if magnitude <= self.threshold {
            return Vec::new();
        }

        let severity = if magnitude > HIGH_SEVERITY_Z {
            Severity::High
        } else {
            Severity::Medium
        };

        let mut metadata = Metadata::new();
        metadata.insert("z_score".to_string(), json!(spike.z_score));
        metadata.insert("historical_mean".to_string(), json!(spike.historical_mean));
        metadata.insert("recent_mean".to_string(), json!(spike.recent_mean));

        vec![Anomaly {
            sensor_id: ctx.sensor_id.to_string(),
            anomaly_type: AnomalyType::EnergySpike,
            severity,
            confidence: (magnitude / HIGH_SEVERITY_Z).min(1.0),
            timestamp: latest.timestamp,
            value: latest.value,
            expected_range: (
                spike.historical_mean - 2.0 * spike.historical_std,
                spike.historical_mean + 2.0 * spike.historical_std,
            ),
            description: format!("Energy spike detected (z-score: {:.2})", spike.z_score),
            recommendations: vec![
                "Check for equipment malfunction".to_string(),
                "Verify load connections".to_string(),
                "Investigate unusual usage patterns".to_string(),
            ],
            metadata,
        }]
    }
}
