//! Core data models for the building monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::ConfigError;

/// Free-form metadata attached to readings and anomalies
pub type Metadata = HashMap<String, serde_json::Value>;

/// Anomaly severity, ordered by rank (low < medium < high < critical)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(ConfigError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Anomaly classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    EnergySpike,
    EquipmentFailure,
    EfficiencyDrop,
    NetworkIsolation,
    SeasonalDeviation,
    OccupancyMismatch,
    Unknown,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 7] = [
        AnomalyType::EnergySpike,
        AnomalyType::EquipmentFailure,
        AnomalyType::EfficiencyDrop,
        AnomalyType::NetworkIsolation,
        AnomalyType::SeasonalDeviation,
        AnomalyType::OccupancyMismatch,
        AnomalyType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::EnergySpike => "energy_spike",
            AnomalyType::EquipmentFailure => "equipment_failure",
            AnomalyType::EfficiencyDrop => "efficiency_drop",
            AnomalyType::NetworkIsolation => "network_isolation",
            AnomalyType::SeasonalDeviation => "seasonal_deviation",
            AnomalyType::OccupancyMismatch => "occupancy_mismatch",
            AnomalyType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_id: String,
    pub sensor_type: String,
    pub unit: String,
    pub zone_id: Option<String>,
    /// (x, y, z) in metres
    pub position: (f64, f64, f64),
}

impl SensorInfo {
    pub fn new(sensor_id: impl Into<String>, sensor_type: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type: sensor_type.into(),
            unit: String::new(),
            zone_id: None,
            position: (0.0, 0.0, 0.0),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    pub fn with_position(mut self, x: f64, y: f64, z: f64) -> Self {
        self.position = (x, y, z);
        self
    }
}

/// A raw sample returned by a sensor source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    /// 0.0 to 1.0
    pub quality: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A reading as kept in a sensor's detection window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub sensor_type: String,
    pub zone_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: f64, sensor_type: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            sensor_type: sensor_type.into(),
            zone_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }
}

/// A detected anomaly. Never mutated once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub sensor_id: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub expected_range: (f64, f64),
    pub description: String,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Operator-facing projection of an anomaly that passed the alert threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// When the alert was raised (not when the anomaly was observed)
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub confidence: f64,
    pub description: String,
    pub recommendations: Vec<String>,
    pub value: f64,
    pub expected_range: (f64, f64),
}

impl Alert {
    pub fn from_anomaly(anomaly: &Anomaly, raised_at: DateTime<Utc>) -> Self {
        Self {
            timestamp: raised_at,
            sensor_id: anomaly.sensor_id.clone(),
            anomaly_type: anomaly.anomaly_type,
            severity: anomaly.severity,
            confidence: anomaly.confidence,
            description: anomaly.description.clone(),
            recommendations: anomaly.recommendations.clone(),
            value: anomaly.value,
            expected_range: anomaly.expected_range,
        }
    }
}

/// One sensor's entry in a sampling snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotEntry {
    Reading {
        value: f64,
        unit: String,
        quality: f64,
        sensor_type: String,
        zone_id: Option<String>,
    },
    Error {
        error: String,
    },
}

impl SnapshotEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, SnapshotEntry::Error { .. })
    }
}

/// Aggregate state of the building at sampling time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSummary {
    pub active_sensors: usize,
    pub total_sensors: usize,
    pub failed_readings: usize,
}

/// Everything collected during one sampling pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSnapshot {
    pub timestamp: DateTime<Utc>,
    pub readings: BTreeMap<String, SnapshotEntry>,
    pub building_summary: StateSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!(" medium ".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_anomaly_type_serialization() {
        let json = serde_json::to_string(&AnomalyType::EnergySpike).unwrap();
        assert_eq!(json, "\"energy_spike\"");
        for t in AnomalyType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn test_snapshot_entry_untagged() {
        let err = SnapshotEntry::Error {
            error: "timeout".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "timeout" }));
        assert!(err.is_error());
    }

    #[test]
    fn test_alert_from_anomaly_keeps_fields() {
        let anomaly = Anomaly {
            sensor_id: "energy_001".to_string(),
            anomaly_type: AnomalyType::EnergySpike,
            severity: Severity::High,
            confidence: 0.9,
            timestamp: Utc::now(),
            value: 500.0,
            expected_range: (90.0, 110.0),
            description: "spike".to_string(),
            recommendations: vec!["check load".to_string()],
            metadata: Metadata::new(),
        };
        let raised_at = Utc::now();
        let alert = Alert::from_anomaly(&anomaly, raised_at);

        assert_eq!(alert.timestamp, raised_at);
        assert_eq!(alert.sensor_id, "energy_001");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.expected_range, (90.0, 110.0));
    }
}
