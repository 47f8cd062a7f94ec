//! Periodic sensor monitoring
//!
//! The monitoring loop samples every registered sensor on a fixed cadence,
//! feeds the readings into the anomaly aggregator and, on a slower cadence,
//! runs detection and forwards the results to the alert processor.

mod r#loop;
mod registry;

#[cfg(test)]
mod tests;

pub use r#loop::{
    AlertOverview, BuildingOverview, DashboardData, MonitoringLoop, MonitoringLoopBuilder,
    MonitoringStatus, SensorHealth, SensorStatistics,
};
pub use registry::SensorRegistry;

use crate::error::SensorError;
use crate::models::{SensorInfo, SensorReading};

pub use async_trait::async_trait;

/// A sensor the loop can sample
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Static description: id, type, zone and position
    fn info(&self) -> &SensorInfo;

    /// Inactive sensors are skipped when sampling
    fn is_active(&self) -> bool;

    /// Take one reading. Failures are transient and scoped to this sensor.
    async fn take_reading(&self) -> Result<SensorReading, SensorError>;
}
