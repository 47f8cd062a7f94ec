//! Cross-sensor correlation breakdown
//!
//! Sensors in the same zone tend to move together. When the correlation of
//! the last few aligned readings departs sharply from the correlation over
//! the whole aligned history, something changed in one of the two sensors.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::json;

use super::rules::{DetectionRule, RuleContext};
use super::stats;
use crate::models::{Anomaly, AnomalyType, Metadata, Reading, Severity};

/// Maximum timestamp difference for two readings to be paired
pub const ALIGNMENT_TOLERANCE_SECS: i64 = 60;

/// Aligned pairs required, and the size of the recent comparison window
const MIN_ALIGNED_PAIRS: usize = 10;

/// |full - recent| correlation change treated as a breakdown
const BREAKDOWN_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct CorrelationRule {
    min_samples: usize,
}

impl CorrelationRule {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    fn compare(
        &self,
        sensor_id: &str,
        readings: &VecDeque<Reading>,
        other_id: &str,
        other: &VecDeque<Reading>,
    ) -> Option<Anomaly> {
        let pairs = align_readings(readings, other);
        if pairs.len() < MIN_ALIGNED_PAIRS {
            return None;
        }

        let (xs, ys): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let full = stats::pearson(&xs, &ys)?;
        let tail = xs.len() - MIN_ALIGNED_PAIRS;
        let recent = stats::pearson(&xs[tail..], &ys[tail..])?;

        let change = (full - recent).abs();
        if change <= BREAKDOWN_THRESHOLD {
            return None;
        }

        let latest = readings.back()?;
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();

        let mut metadata = Metadata::new();
        metadata.insert("historical_correlation".to_string(), json!(full));
        metadata.insert("recent_correlation".to_string(), json!(recent));
        metadata.insert("correlation_change".to_string(), json!(change));
        metadata.insert("correlated_sensor".to_string(), json!(other_id));

        Some(Anomaly {
            sensor_id: sensor_id.to_string(),
            anomaly_type: AnomalyType::NetworkIsolation,
            severity: Severity::Medium,
            confidence: change.min(1.0),
            timestamp: latest.timestamp,
            value: latest.value,
            expected_range: stats::expected_range(&values),
            description: format!("Correlation breakdown with sensor {}", other_id),
            recommendations: vec![
                "Check sensor connectivity".to_string(),
                "Verify both sensors are operational".to_string(),
                "Investigate environmental changes".to_string(),
            ],
            metadata,
        })
    }
}

impl DetectionRule for CorrelationRule {
    fn name(&self) -> &'static str {
        "correlation_breakdown"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Anomaly> {
        let Some(zone) = ctx.readings.back().and_then(|r| r.zone_id.as_deref()) else {
            return Vec::new();
        };

        ctx.buffers
            .iter()
            .filter(|(id, buffer)| id.as_str() != ctx.sensor_id && buffer.len() >= self.min_samples)
            .filter(|(_, buffer)| {
                buffer
                    .latest()
                    .and_then(|r| r.zone_id.as_deref())
                    .is_some_and(|z| z == zone)
            })
            .filter_map(|(other_id, buffer)| {
                self.compare(ctx.sensor_id, ctx.readings, other_id, buffer.all())
            })
            .collect()
    }
}

/// Pair readings from two sensors by timestamp.
///
/// Readings sharing a timestamp collapse to one entry holding the later
/// value. Each reading of the first series is paired with the first reading
/// of the second series within the tolerance. Matching is greedy: a reading
/// of the second series may be used by several pairs.
pub fn align_readings(a: &VecDeque<Reading>, b: &VecDeque<Reading>) -> Vec<(f64, f64)> {
    let a = collapse_timestamps(a);
    let b = collapse_timestamps(b);

    a.iter()
        .filter_map(|(ts_a, value_a)| {
            b.iter()
                .find(|(ts_b, _)| {
                    (*ts_a - *ts_b).num_milliseconds().abs() <= ALIGNMENT_TOLERANCE_SECS * 1000
                })
                .map(|(_, value_b)| (*value_a, *value_b))
        })
        .collect()
}

fn collapse_timestamps(readings: &VecDeque<Reading>) -> Vec<(DateTime<Utc>, f64)> {
    let mut positions: HashMap<DateTime<Utc>, usize> = HashMap::new();
    let mut collapsed: Vec<(DateTime<Utc>, f64)> = Vec::with_capacity(readings.len());

    for reading in readings {
        match positions.get(&reading.timestamp) {
            Some(&index) => collapsed[index].1 = reading.value,
            None => {
                positions.insert(reading.timestamp, collapsed.len());
                collapsed.push((reading.timestamp, reading.value));
            }
        }
    }

    collapsed
}
