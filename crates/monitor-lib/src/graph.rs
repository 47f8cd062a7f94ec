//! Sensor adjacency graph
//!
//! Nodes are sensors; an undirected edge joins two sensors that share a zone
//! or sit closer than a distance threshold. The graph is rebuilt from the
//! current sensor set whenever it is needed and never updated in place.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::SensorInfo;

/// Node attributes carried alongside the adjacency
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub sensor_type: String,
    pub zone_id: Option<String>,
    pub position: (f64, f64, f64),
}

/// Undirected, simple graph keyed by sensor id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkGraph {
    nodes: BTreeMap<String, GraphNode>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the proximity graph for a set of sensors.
    ///
    /// Sensors without a zone are treated as sharing the same (unnamed) zone.
    pub fn from_sensors<'a, I>(sensors: I, distance_threshold: f64) -> Self
    where
        I: IntoIterator<Item = &'a SensorInfo>,
    {
        let sensors: Vec<&SensorInfo> = sensors.into_iter().collect();
        let mut graph = Self::new();

        for sensor in &sensors {
            graph.add_node(
                &sensor.sensor_id,
                GraphNode {
                    sensor_type: sensor.sensor_type.clone(),
                    zone_id: sensor.zone_id.clone(),
                    position: sensor.position,
                },
            );
        }

        for (i, a) in sensors.iter().enumerate() {
            for b in &sensors[i + 1..] {
                if a.zone_id == b.zone_id || distance(a.position, b.position) < distance_threshold {
                    graph.add_edge(&a.sensor_id, &b.sensor_id);
                }
            }
        }

        graph
    }

    pub fn add_node(&mut self, id: &str, node: GraphNode) {
        self.nodes.insert(id.to_string(), node);
        self.adjacency.entry(id.to_string()).or_default();
    }

    /// Add an undirected edge. Self-loops and edges to unknown nodes are ignored.
    pub fn add_edge(&mut self, a: &str, b: &str) {
        if a == b || !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return;
        }
        self.adjacency.entry(a.to_string()).or_default().insert(b.to_string());
        self.adjacency.entry(b.to_string()).or_default().insert(a.to_string());
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &GraphNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map_or(0, BTreeSet::len)
    }

    pub fn neighbors(&self, id: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Nodes with no edges, in id order
    pub fn isolated_nodes(&self) -> Vec<&str> {
        self.nodes
            .keys()
            .filter(|id| self.degree(id) == 0)
            .map(String::as_str)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}

/// Source of the current sensor graph. `None` disables the isolation check.
pub trait GraphProvider: Send + Sync {
    fn sensor_network_graph(&self) -> Option<NetworkGraph>;
}

fn distance(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(id: &str, zone: Option<&str>, position: (f64, f64, f64)) -> SensorInfo {
        let (x, y, z) = position;
        let info = SensorInfo::new(id, "hvac_temperature").with_position(x, y, z);
        match zone {
            Some(zone) => info.with_zone(zone),
            None => info,
        }
    }

    #[test]
    fn test_same_zone_sensors_are_adjacent() {
        let sensors = vec![
            sensor("a", Some("office"), (0.0, 0.0, 0.0)),
            sensor("b", Some("office"), (100.0, 0.0, 0.0)),
            sensor("c", Some("lobby"), (200.0, 0.0, 0.0)),
        ];
        let graph = NetworkGraph::from_sensors(&sensors, 20.0);

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.degree("a"), 1);
        assert_eq!(graph.isolated_nodes(), vec!["c"]);
    }

    #[test]
    fn test_nearby_sensors_in_different_zones_are_adjacent() {
        let sensors = vec![
            sensor("a", Some("office"), (0.0, 0.0, 0.0)),
            sensor("b", Some("lobby"), (10.0, 10.0, 0.0)),
        ];
        let graph = NetworkGraph::from_sensors(&sensors, 20.0);
        assert_eq!(graph.neighbors("a").collect::<Vec<_>>(), vec!["b"]);

        // Exactly at the threshold is not adjacent
        let sensors = vec![
            sensor("a", Some("office"), (0.0, 0.0, 0.0)),
            sensor("b", Some("lobby"), (20.0, 0.0, 0.0)),
        ];
        let graph = NetworkGraph::from_sensors(&sensors, 20.0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_edge_ignores_unknown_and_self() {
        let mut graph = NetworkGraph::new();
        graph.add_node(
            "a",
            GraphNode {
                sensor_type: "energy_power".into(),
                zone_id: None,
                position: (0.0, 0.0, 0.0),
            },
        );
        graph.add_edge("a", "a");
        graph.add_edge("a", "missing");
        assert_eq!(graph.degree("a"), 0);
        assert_eq!(graph.degree("missing"), 0);
    }
}
