//! Seeded isolation forest over claim features
//!
//! Points that random axis-parallel splits isolate in few steps get high
//! scores. Every tree owns an RNG derived from the configured seed and its
//! position in the forest, so trees can be grown on the rayon pool while the
//! output stays identical from run to run.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::anomaly::{ClaimScorer, Detection, MethodKind};
use crate::data::ClaimTable;

pub const DEFAULT_TREES: usize = 100;
pub const DEFAULT_SAMPLE_SIZE: usize = 256;
pub const DEFAULT_SEED: u64 = 42;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Numeric claim features the forest can split on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ClaimAmount,
    /// Claims billed for the same patient across the table
    PatientClaimCount,
    /// Claims billed by the same provider across the table
    ProviderClaimCount,
}

/// Isolation forest scorer; flags the top `contamination` fraction of claims
#[derive(Debug, Clone)]
pub struct IsolationForestScorer {
    contamination: f64,
    features: Vec<Feature>,
    seed: u64,
    n_trees: usize,
    sample_size: usize,
}

impl IsolationForestScorer {
    pub fn new(contamination: f64, features: Vec<Feature>, seed: u64) -> Self {
        let features = if features.is_empty() {
            vec![Feature::ClaimAmount]
        } else {
            features
        };

        Self {
            contamination,
            features,
            seed,
            n_trees: DEFAULT_TREES,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees.max(1);
        self
    }

    /// Raw isolation scores in (0, 1], higher is more anomalous
    pub fn raw_scores(&self, table: &ClaimTable) -> Vec<f64> {
        let n = table.len();
        if n == 0 {
            return Vec::new();
        }

        let data = feature_matrix(table, &self.features);
        let psi = self.sample_size.min(n);
        let height_limit = (psi as f64).log2().ceil() as usize;
        let norm = average_path_length(psi);

        let trees: Vec<IsolationTree> = (0..self.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(self.seed, t));
                let sample = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                IsolationTree::grow(&data, sample, height_limit, &mut rng)
            })
            .collect();

        log::debug!(
            "Grew {} isolation trees (sample size {}, height limit {})",
            trees.len(),
            psi,
            height_limit
        );

        data.par_iter()
            .map(|point| {
                if norm == 0.0 {
                    return 0.5;
                }
                let total: f64 = trees.iter().map(|tree| tree.path_length(point)).sum();
                let mean_path = total / trees.len() as f64;
                2f64.powf(-mean_path / norm)
            })
            .collect()
    }
}

impl ClaimScorer for IsolationForestScorer {
    fn kind(&self) -> MethodKind {
        MethodKind::Ensemble
    }

    fn score(&self, table: &ClaimTable) -> Vec<Option<Detection>> {
        let raw = self.raw_scores(table);
        if raw.is_empty() {
            return Vec::new();
        }

        let min = raw.iter().copied().fold(f64::INFINITY, f64::min);
        let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let normalized: Vec<f64> = if max > min {
            raw.iter().map(|&s| (s - min) / (max - min)).collect()
        } else {
            vec![0.0; raw.len()]
        };

        // Subtract a hair so 0.05 * 20 cannot round up to 2
        let quota = ((self.contamination * raw.len() as f64) - 1e-9).ceil().max(0.0) as usize;

        let mut order: Vec<usize> = (0..raw.len()).collect();
        order.sort_by(|&a, &b| raw[b].total_cmp(&raw[a]).then(a.cmp(&b)));

        let mut flagged = vec![false; raw.len()];
        for &row in order.iter().take(quota) {
            flagged[row] = normalized[row] > 0.0;
        }

        log::debug!(
            "Isolation forest flagged {} of {} claims",
            flagged.iter().filter(|&&f| f).count(),
            raw.len()
        );

        normalized
            .into_iter()
            .zip(flagged)
            .map(|(score, flag)| Some(Detection::new(score, flag)))
            .collect()
    }
}

/// Independent, reproducible seed for tree `t`
fn tree_seed(seed: u64, t: usize) -> u64 {
    seed.wrapping_add((t as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Row-major matrix of standard-scaled features
fn feature_matrix(table: &ClaimTable, features: &[Feature]) -> Vec<Vec<f64>> {
    let mut patient_counts: HashMap<i64, usize> = HashMap::new();
    let mut provider_counts: HashMap<i64, usize> = HashMap::new();
    for claim in table {
        *patient_counts.entry(claim.patient_id).or_insert(0) += 1;
        *provider_counts.entry(claim.provider_id).or_insert(0) += 1;
    }

    let columns: Vec<Vec<f64>> = features
        .iter()
        .map(|feature| {
            let column: Vec<f64> = table
                .iter()
                .map(|claim| match feature {
                    Feature::ClaimAmount => claim.claim_amount,
                    Feature::PatientClaimCount => patient_counts[&claim.patient_id] as f64,
                    Feature::ProviderClaimCount => provider_counts[&claim.provider_id] as f64,
                })
                .collect();
            standard_scale(column)
        })
        .collect();

    (0..table.len())
        .map(|row| columns.iter().map(|column| column[row]).collect())
        .collect()
}

fn standard_scale(mut column: Vec<f64>) -> Vec<f64> {
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    let std_dev = (column.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();

    for value in column.iter_mut() {
        *value = if std_dev > 0.0 { (*value - mean) / std_dev } else { 0.0 };
    }
    column
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split { feature: usize, value: f64, left: usize, right: usize },
}

/// One randomized partitioning tree stored as an arena of nodes
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, sample, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });

        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it
        let feature_count = data[rows[0]].len();
        let splittable: Vec<(usize, f64, f64)> = (0..feature_count)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][f]), hi.max(data[r][f]))
                });
                (lo < hi).then_some((f, lo, hi))
            })
            .collect();

        if splittable.is_empty() {
            return id;
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let value = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] < value);

        let left = self.build(data, left_rows, depth + 1, height_limit, rng);
        let right = self.build(data, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split { feature, value, left, right };

        id
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(size),
                Node::Split { feature, value, left, right } => {
                    node = if point[feature] < value { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}
