//! Export of monitoring data as a JSON document

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ExportError;
use crate::models::{Alert, ReadingSnapshot, SensorInfo};
use crate::monitor::MonitoringStatus;

/// Everything the monitor knows, in one serializable document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSnapshot {
    pub export_timestamp: DateTime<Utc>,
    pub monitoring_status: MonitoringStatus,
    pub readings: Vec<ReadingSnapshot>,
    pub alerts: Vec<Alert>,
    pub sensor_summary: BTreeMap<String, SensorInfo>,
}

impl ExportSnapshot {
    /// Write the document as pretty-printed JSON, replacing any existing file
    pub fn write_json(&self, path: &Path) -> Result<(), ExportError> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        info!(
            path = %path.display(),
            readings = self.readings.len(),
            alerts = self.alerts.len(),
            "Exported monitoring data"
        );
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, ExportError> {
        let body = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&body)?)
    }
}
