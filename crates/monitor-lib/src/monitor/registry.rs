//! Registry of the sensors being monitored

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::SensorSource;
use crate::config::DEFAULT_NETWORK_DISTANCE;
use crate::graph::{GraphProvider, NetworkGraph};
use crate::models::SensorInfo;

/// Concurrent map of sensor id to sensor source
pub struct SensorRegistry {
    sensors: DashMap<String, Arc<dyn SensorSource>>,
    /// Adjacency radius, stored as `f64` bits
    distance_threshold: AtomicU64,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self {
            sensors: DashMap::new(),
            distance_threshold: AtomicU64::new(DEFAULT_NETWORK_DISTANCE.to_bits()),
        }
    }

    /// Set the adjacency radius used when building the network graph
    pub fn with_distance_threshold(self, threshold: f64) -> Self {
        self.set_distance_threshold(threshold);
        self
    }

    pub fn set_distance_threshold(&self, threshold: f64) {
        self.distance_threshold
            .store(threshold.to_bits(), Ordering::Relaxed);
    }

    pub fn distance_threshold(&self) -> f64 {
        f64::from_bits(self.distance_threshold.load(Ordering::Relaxed))
    }

    /// Register a sensor, replacing any sensor with the same id
    pub fn register(&self, sensor: Arc<dyn SensorSource>) {
        let id = sensor.info().sensor_id.clone();
        debug!(sensor_id = %id, "Registering sensor");
        self.sensors.insert(id, sensor);
    }

    pub fn unregister(&self, sensor_id: &str) -> Option<Arc<dyn SensorSource>> {
        debug!(sensor_id = %sensor_id, "Unregistering sensor");
        self.sensors.remove(sensor_id).map(|(_, v)| v)
    }

    pub fn get(&self, sensor_id: &str) -> Option<Arc<dyn SensorSource>> {
        self.sensors.get(sensor_id).map(|r| Arc::clone(r.value()))
    }

    /// All sensors, ordered by id
    pub fn list(&self) -> Vec<Arc<dyn SensorSource>> {
        let mut sensors: Vec<Arc<dyn SensorSource>> =
            self.sensors.iter().map(|r| Arc::clone(r.value())).collect();
        sensors.sort_by(|a, b| a.info().sensor_id.cmp(&b.info().sensor_id));
        sensors
    }

    /// Descriptions of all sensors, ordered by id
    pub fn infos(&self) -> Vec<SensorInfo> {
        self.list().iter().map(|s| s.info().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.sensors.iter().filter(|r| r.value().is_active()).count()
    }

    /// Number of distinct zones among registered sensors
    pub fn zone_count(&self) -> usize {
        self.sensors
            .iter()
            .filter_map(|r| r.value().info().zone_id.clone())
            .collect::<BTreeSet<String>>()
            .len()
    }
}

impl GraphProvider for SensorRegistry {
    fn sensor_network_graph(&self) -> Option<NetworkGraph> {
        let infos = self.infos();
        Some(NetworkGraph::from_sensors(&infos, self.distance_threshold()))
    }
}
