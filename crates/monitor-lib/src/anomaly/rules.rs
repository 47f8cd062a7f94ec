//! Rule-based detection checks
//!
//! Each rule looks at one sensor's window (and, where needed, the windows
//! of the other sensors) and returns zero or more anomalies. Rules never
//! fail: statistically degenerate inputs simply produce nothing.

use std::collections::{BTreeMap, VecDeque};

use super::buffer::ReadingBuffer;
use super::correlation_detector::CorrelationRule;
use super::network_detector::NetworkIsolationRule;
use super::spike_detector::EnergySpikeRule;
use super::temporal_detector::TemporalRule;
use crate::config::DetectorConfig;
use crate::graph::NetworkGraph;
use crate::models::{Anomaly, Reading};

/// Everything a per-sensor rule can see
pub struct RuleContext<'a> {
    pub sensor_id: &'a str,
    pub readings: &'a VecDeque<Reading>,
    pub buffers: &'a BTreeMap<String, ReadingBuffer>,
}

/// A per-sensor detection rule
pub trait DetectionRule: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Anomaly>;
}

/// The domain rules applied to each sensor, plus the graph-wide isolation check
pub struct RuleEngine {
    rules: Vec<Box<dyn DetectionRule>>,
    network: NetworkIsolationRule,
}

impl RuleEngine {
    pub fn new(config: &DetectorConfig) -> Self {
        let rules: Vec<Box<dyn DetectionRule>> = vec![
            Box::new(EnergySpikeRule::new(config.energy_spike_threshold)),
            Box::new(TemporalRule::default()),
            Box::new(CorrelationRule::new(config.min_samples_for_detection)),
        ];

        Self {
            rules,
            network: NetworkIsolationRule::new(config.min_samples_for_detection),
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules
            .iter()
            .map(|r| r.name())
            .chain(std::iter::once(self.network.name()))
            .collect()
    }

    /// Run every per-sensor rule and concatenate the results in rule order
    pub fn evaluate_sensor(&self, ctx: &RuleContext<'_>) -> Vec<Anomaly> {
        self.rules.iter().flat_map(|rule| rule.evaluate(ctx)).collect()
    }

    /// Run the isolation check once over the whole graph
    pub fn evaluate_network(
        &self,
        graph: &NetworkGraph,
        buffers: &BTreeMap<String, ReadingBuffer>,
    ) -> Vec<Anomaly> {
        self.network.evaluate(graph, buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_lists_all_rules() {
        let engine = RuleEngine::new(&DetectorConfig::default());
        assert_eq!(
            engine.rule_names(),
            vec!["energy_spike", "temporal_pattern", "correlation_breakdown", "network_isolation"]
        );
    }
}
