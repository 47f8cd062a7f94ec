//! Network isolation: sensors with no neighbours in the adjacency graph

use std::collections::BTreeMap;

use serde_json::json;

use super::buffer::ReadingBuffer;
use super::stats;
use crate::graph::NetworkGraph;
use crate::models::{Anomaly, AnomalyType, Metadata, Severity};

#[derive(Debug, Clone)]
pub struct NetworkIsolationRule {
    min_samples: usize,
}

impl NetworkIsolationRule {
    pub fn new(min_samples: usize) -> Self {
        Self { min_samples }
    }

    pub fn name(&self) -> &'static str {
        "network_isolation"
    }

    /// One anomaly per degree-0 node that has enough buffered readings,
    /// anchored at that sensor's latest reading
    pub fn evaluate(
        &self,
        graph: &NetworkGraph,
        buffers: &BTreeMap<String, ReadingBuffer>,
    ) -> Vec<Anomaly> {
        graph
            .isolated_nodes()
            .into_iter()
            .filter_map(|sensor_id| {
                let buffer = buffers.get(sensor_id)?;
                if buffer.len() < self.min_samples {
                    return None;
                }
                let latest = buffer.latest()?;

                let mut metadata = Metadata::new();
                metadata.insert("network_degree".to_string(), json!(0));

                Some(Anomaly {
                    sensor_id: sensor_id.to_string(),
                    anomaly_type: AnomalyType::NetworkIsolation,
                    severity: Severity::High,
                    confidence: 1.0,
                    timestamp: latest.timestamp,
                    value: latest.value,
                    expected_range: stats::expected_range(&buffer.values()),
                    description: "Sensor isolated from network".to_string(),
                    recommendations: vec![
                        "Check network connectivity".to_string(),
                        "Verify sensor power supply".to_string(),
                        "Inspect physical connections".to_string(),
                    ],
                    metadata,
                })
            })
            .collect()
    }
}
