//! Isolation forest outlier scoring
//!
//! An ensemble of random partitioning trees. Points that are isolated in
//! few splits get short average path lengths and therefore low scores.
//! The decision threshold is calibrated so that roughly `contamination`
//! of the training points fall below it.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::debug;

use super::stats;
use crate::config::DetectorConfig;
use crate::error::ModelError;
use crate::models::{Anomaly, AnomalyType, Metadata, Reading, Severity};

/// Default number of trees in the ensemble
pub const DEFAULT_NUM_TREES: usize = 100;

/// Default per-tree subsample size
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Divisor mapping |decision value| onto a [0, 1] confidence.
///
/// Empirical: typical decision magnitudes sit well under 0.5, so a value of
/// -0.5 or lower maps to full confidence.
pub const CONFIDENCE_NORMALIZER: f64 = 0.5;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Expected path length of an unsuccessful BST search over `n` points,
/// used both to normalise scores and to extend paths at truncated leaves
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Configuration for the isolation forest
#[derive(Debug, Clone)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Subsample size for each tree
    pub max_samples: usize,
    /// Expected outlier fraction
    pub contamination: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: DEFAULT_NUM_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: 0.05,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: usize,
        right: usize,
    },
    External {
        size: usize,
    },
}

/// A single random partitioning tree stored as a flat node array
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build(samples: &[&[f64]], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(samples, 0, max_depth, rng);
        tree
    }

    fn grow(&mut self, samples: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> usize {
        let index = self.nodes.len();

        if depth >= max_depth || samples.len() <= 1 {
            self.nodes.push(Node::External { size: samples.len() });
            return index;
        }

        // Only features that still have spread can split this node
        let num_features = samples[0].len();
        let candidates: Vec<(usize, f64, f64)> = (0..num_features)
            .filter_map(|feature| {
                let (lo, hi) = samples.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), s| (lo.min(s[feature]), hi.max(s[feature])),
                );
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            self.nodes.push(Node::External { size: samples.len() });
            return index;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let split = draw_split(lo, hi, rng);

        // lo < split <= hi guarantees both sides are non-empty
        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
            samples.iter().copied().partition(|s| s[feature] < split);

        // Reserve the slot, children are appended after it
        self.nodes.push(Node::External { size: samples.len() });
        let left_index = self.grow(&left, depth + 1, max_depth, rng);
        let right_index = self.grow(&right, depth + 1, max_depth, rng);
        self.nodes[index] = Node::Internal {
            feature,
            split,
            left: left_index,
            right: right_index,
        };

        index
    }

    fn path_length(&self, sample: &[f64]) -> f64 {
        let mut index = 0;
        let mut depth = 0.0;

        loop {
            match self.nodes.get(index) {
                Some(Node::External { size }) => return depth + average_path_length(*size),
                Some(Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                }) => {
                    let value = sample.get(*feature).copied().unwrap_or(0.0);
                    index = if value < *split { *left } else { *right };
                    depth += 1.0;
                }
                None => return depth,
            }
        }
    }
}

/// Uniform split point in (lo, hi] for finite `lo < hi`.
///
/// Interpolates instead of drawing on `lo..hi` so that ranges whose width
/// overflows `f64` still produce a finite split.
fn draw_split(lo: f64, hi: f64, rng: &mut StdRng) -> f64 {
    let t: f64 = rng.gen();
    let split = lo * (1.0 - t) + hi * t;
    if split > lo && split <= hi {
        split
    } else {
        lo / 2.0 + hi / 2.0
    }
}

/// Isolation forest over fixed-width feature vectors
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: ForestConfig,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    num_features: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            sample_size: 0,
            num_features: 0,
            offset: -0.5,
        }
    }

    /// Train the forest and calibrate the decision offset on `samples`
    pub fn fit(&mut self, samples: &[Vec<f64>]) -> Result<(), ModelError> {
        let first = samples.first().ok_or(ModelError::EmptyInput)?;
        let num_features = first.len();
        if num_features == 0 {
            return Err(ModelError::EmptyInput);
        }
        if let Some((index, bad)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.len() != num_features)
        {
            return Err(ModelError::FeatureMismatch {
                index,
                expected: num_features,
                got: bad.len(),
            });
        }
        if let Some(index) = samples
            .iter()
            .position(|s| s.iter().any(|v| !v.is_finite()))
        {
            return Err(ModelError::NonFinite { index });
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let sample_size = self.config.max_samples.clamp(1, samples.len());
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        self.trees.clear();
        self.sample_size = sample_size;
        self.num_features = num_features;

        for _ in 0..self.config.num_trees.max(1) {
            let subset: Vec<&[f64]> = index::sample(&mut rng, samples.len(), sample_size)
                .into_iter()
                .map(|i| samples[i].as_slice())
                .collect();
            self.trees
                .push(IsolationTree::build(&subset, max_depth, &mut rng));
        }

        let mut training_scores: Vec<f64> = samples.iter().map(|s| self.score_sample(s)).collect();
        training_scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.offset = stats::percentile(&training_scores, 100.0 * self.config.contamination)
            .unwrap_or(-0.5);

        Ok(())
    }

    /// Negated anomaly score in [-1, 0]; lower is more anomalous
    pub fn score_sample(&self, sample: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return -0.5;
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(sample)).sum::<f64>()
            / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size).max(f64::EPSILON);
        -(2f64.powf(-mean_path / normalizer))
    }

    /// Score shifted by the calibrated offset; negative means outlier
    pub fn decision_function(&self, sample: &[f64]) -> f64 {
        self.score_sample(sample) - self.offset
    }

    pub fn is_outlier(&self, sample: &[f64]) -> bool {
        self.decision_function(sample) < 0.0
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

/// Per-point result from the outlier scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierScore {
    pub index: usize,
    /// Decision value; more negative is more anomalous
    pub score: f64,
    pub is_outlier: bool,
}

impl OutlierScore {
    pub fn confidence(&self) -> f64 {
        (self.score.abs() / CONFIDENCE_NORMALIZER).min(1.0)
    }
}

/// Fits a fresh, seeded forest on a sensor's window and flags outliers
#[derive(Debug, Clone)]
pub struct OutlierScorer {
    forest_config: ForestConfig,
    min_samples: usize,
}

impl OutlierScorer {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            forest_config: ForestConfig {
                contamination: config.contamination,
                seed: config.seed,
                ..Default::default()
            },
            min_samples: config.min_samples_for_detection,
        }
    }

    pub fn with_forest_config(mut self, forest_config: ForestConfig) -> Self {
        self.forest_config = forest_config;
        self
    }

    /// Score every value. Empty when fewer than `min_samples` values are given
    /// or when any value is not finite.
    pub fn score(&self, values: &[f64]) -> Vec<OutlierScore> {
        if values.len() < self.min_samples {
            return Vec::new();
        }

        let samples: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
        let mut forest = IsolationForest::new(self.forest_config.clone());
        if forest.fit(&samples).is_err() {
            return Vec::new();
        }

        samples
            .iter()
            .enumerate()
            .map(|(index, sample)| {
                let score = forest.decision_function(sample);
                OutlierScore {
                    index,
                    score,
                    is_outlier: score < 0.0,
                }
            })
            .collect()
    }

    /// Flag outlying readings in a sensor's window
    pub fn detect(&self, sensor_id: &str, readings: &VecDeque<Reading>) -> Vec<Anomaly> {
        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            debug!(
                sensor_id = %sensor_id,
                value = %bad,
                "Skipping outlier scoring for window with non-finite reading"
            );
            return Vec::new();
        }
        let scores = self.score(&values);
        if scores.is_empty() {
            return Vec::new();
        }

        let expected_range = stats::expected_range(&values);

        scores
            .iter()
            .filter(|s| s.is_outlier)
            .filter_map(|s| readings.get(s.index).map(|reading| (s, reading)))
            .map(|(s, reading)| {
                let confidence = s.confidence();
                let mut metadata = Metadata::new();
                metadata.insert("algorithm".to_string(), json!("isolation_forest"));
                metadata.insert("score".to_string(), json!(s.score));

                Anomaly {
                    sensor_id: sensor_id.to_string(),
                    anomaly_type: AnomalyType::Unknown,
                    severity: severity_from_confidence(confidence),
                    confidence,
                    timestamp: reading.timestamp,
                    value: reading.value,
                    expected_range,
                    description: format!("Isolation forest flagged reading (score: {:.3})", s.score),
                    recommendations: vec![
                        "Investigate sensor reading".to_string(),
                        "Check equipment status".to_string(),
                    ],
                    metadata,
                }
            })
            .collect()
    }
}

/// Map outlier confidence onto a severity band
pub fn severity_from_confidence(confidence: f64) -> Severity {
    if confidence > 0.8 {
        Severity::Critical
    } else if confidence > 0.6 {
        Severity::High
    } else if confidence > 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
