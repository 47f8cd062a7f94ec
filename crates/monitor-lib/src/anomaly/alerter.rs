//! Alert processing for detected anomalies
//!
//! Anomalies at or above the configured severity become alerts. Alerts are
//! appended to a bounded store and logged; existing entries are never
//! modified, so readers always see whole records.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::models::{Alert, Anomaly, Severity};

/// Filters anomalies by severity and records the survivors as alerts
pub struct AlertProcessor {
    threshold: Severity,
    capacity: usize,
    alerts: RwLock<VecDeque<Alert>>,
}

impl AlertProcessor {
    /// Create a processor keeping at most `capacity` alerts
    pub fn new(threshold: Severity, capacity: usize) -> Self {
        Self {
            threshold,
            capacity: capacity.max(1),
            alerts: RwLock::new(VecDeque::new()),
        }
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    /// Record an alert for every anomaly whose severity reaches the threshold.
    ///
    /// Returns the alerts created by this call, in input order.
    pub fn process(&self, anomalies: &[Anomaly]) -> Vec<Alert> {
        self.process_at(Utc::now(), anomalies)
    }

    pub fn process_at(&self, raised_at: DateTime<Utc>, anomalies: &[Anomaly]) -> Vec<Alert> {
        let raised: Vec<Alert> = anomalies
            .iter()
            .filter(|a| a.severity >= self.threshold)
            .map(|a| Alert::from_anomaly(a, raised_at))
            .collect();

        if raised.is_empty() {
            return raised;
        }

        for alert in &raised {
            warn!(
                event = "alert_raised",
                sensor_id = %alert.sensor_id,
                severity = %alert.severity,
                anomaly_type = %alert.anomaly_type,
                confidence = alert.confidence,
                "ALERT [{}] Sensor {}: {}",
                alert.severity.as_str().to_uppercase(),
                alert.sensor_id,
                alert.description
            );
        }

        let mut store = self.alerts.write().unwrap_or_else(PoisonError::into_inner);
        store.extend(raised.iter().cloned());
        while store.len() > self.capacity {
            store.pop_front();
        }

        raised
    }

    /// Copy of every stored alert, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Alerts raised within the last `hours`, oldest first
    pub fn recent(&self, hours: i64) -> Vec<Alert> {
        self.since(Utc::now() - Duration::hours(hours))
    }

    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<Alert> {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.alerts.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
