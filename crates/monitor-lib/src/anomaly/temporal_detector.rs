//! Hour-of-day baseline deviation

use chrono::Timelike;
use serde_json::json;

use super::rules::{DetectionRule, RuleContext};
use super::stats;
use crate::models::{Anomaly, AnomalyType, Metadata, Severity};

/// Readings required before hourly baselines are meaningful
pub const MIN_TEMPORAL_READINGS: usize = 24;

/// Compares the latest reading with earlier readings taken in the same
/// UTC hour of day
#[derive(Debug, Clone)]
pub struct TemporalRule {
    pub deviation_threshold: f64,
    pub high_severity_deviation: f64,
}

impl Default for TemporalRule {
    fn default() -> Self {
        Self {
            deviation_threshold: 2.5,
            high_severity_deviation: 4.0,
        }
    }
}

impl DetectionRule for TemporalRule {
    fn name(&self) -> &'static str {
        "temporal_pattern"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Anomaly> {
        if ctx.readings.len() < MIN_TEMPORAL_READINGS {
            return Vec::new();
        }
        let Some(latest) = ctx.readings.back() else {
            return Vec::new();
        };
        let hour = latest.timestamp.hour();

        let bucket: Vec<f64> = ctx
            .readings
            .iter()
            .take(ctx.readings.len() - 1)
            .filter(|r| r.timestamp.hour() == hour)
            .map(|r| r.value)
            .collect();

        // No history for this hour, or a single sample
        let (Some(hourly_mean), Some(hourly_std)) = (stats::mean(&bucket), stats::sample_std(&bucket))
        else {
            return Vec::new();
        };
        if hourly_std < f64::EPSILON {
            return Vec::new();
        }

        let deviation = (latest.value - hourly_mean).abs() / hourly_std;
        if deviation <= self.deviation_threshold {
            return Vec::new();
        }

        let severity = if deviation > self.high_severity_deviation {
            Severity::High
        } else {
            Severity::Medium
        };

        let mut metadata = Metadata::new();
        metadata.insert("hourly_deviation".to_string(), json!(deviation));
        metadata.insert("expected_mean".to_string(), json!(hourly_mean));
        metadata.insert("hour".to_string(), json!(hour));

        vec![Anomaly {
            sensor_id: ctx.sensor_id.to_string(),
            anomaly_type: AnomalyType::SeasonalDeviation,
            severity,
            confidence: (deviation / self.high_severity_deviation).min(1.0),
            timestamp: latest.timestamp,
            value: latest.value,
            expected_range: (hourly_mean - 2.0 * hourly_std, hourly_mean + 2.0 * hourly_std),
            description: format!("Unusual value for time of day (deviation: {:.2}σ)", deviation),
            recommendations: vec![
                "Compare with historical patterns".to_string(),
                "Check for schedule changes".to_string(),
                "Verify sensor calibration".to_string(),
            ],
            metadata,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::buffer::ReadingBuffer;
    use crate::models::Reading;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::{BTreeMap, VecDeque};

    /// One reading per day at 14:00 UTC with the given values
    fn daily(values: &[f64]) -> VecDeque<Reading> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::new(base + Duration::days(i as i64), *v, "hvac_temperature"))
            .collect()
    }

    fn evaluate(readings: &VecDeque<Reading>) -> Vec<Anomaly> {
        let buffers = BTreeMap::<String, ReadingBuffer>::new();
        TemporalRule::default().evaluate(&RuleContext {
            sensor_id: "hvac_001",
            readings,
            buffers: &buffers,
        })
    }

    #[test]
    fn test_flags_large_hourly_deviation() {
        let mut values: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 21.0 } else { 23.0 }).collect();
        values.push(40.0);
        let anomalies = evaluate(&daily(&values));

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::SeasonalDeviation);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].confidence, 1.0);
    }

    #[test]
    fn test_zero_hourly_variance_does_not_flag() {
        let mut values = vec![22.0; 30];
        values.push(90.0);
        assert!(evaluate(&daily(&values)).is_empty());
    }

    #[test]
    fn test_requires_minimum_readings() {
        let mut values: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 21.0 } else { 23.0 }).collect();
        values.push(40.0);
        assert!(evaluate(&daily(&values)).is_empty());
    }

    #[test]
    fn test_hour_without_history_does_not_flag() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        // Hourly readings for one day, latest lands on an hour not seen before
        let readings: VecDeque<Reading> = (0..25)
            .map(|i| {
                let value = if i == 24 { 80.0 } else { 20.0 + (i % 3) as f64 };
                Reading::new(base + Duration::minutes(i * 55), value, "hvac_temperature")
            })
            .collect();
        assert!(evaluate(&readings).is_empty());
    }
}
