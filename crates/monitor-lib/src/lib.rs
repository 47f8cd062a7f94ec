//! Core library for the smart building monitor
//!
//! This crate provides:
//! - Bounded per-sensor reading windows
//! - Outlier scoring with an isolation forest
//! - Rule-based detection (energy spikes, hourly baselines, correlation
//!   breakdowns, network isolation)
//! - Anomaly aggregation and alerting
//! - The periodic monitoring loop and its JSON export
//! - Prometheus metrics and structured logging

pub mod anomaly;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod models;
pub mod monitor;
pub mod observability;

pub use anomaly::{AlertProcessor, AnomalyAggregator, AnomalySummary, WindowStatistics};
pub use config::{DetectorConfig, MonitoringConfig};
pub use error::{ConfigError, ExportError, ModelError, SensorError};
pub use export::ExportSnapshot;
pub use models::*;
pub use monitor::{MonitoringLoop, MonitoringStatus, SensorRegistry, SensorSource};
pub use observability::{MonitorMetrics, StructuredLogger};
