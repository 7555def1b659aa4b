//! Suspicious cluster ("fraud ring") analysis module

pub mod detection;
pub mod metrics;

use std::borrow::Cow;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::ClaimTable;
use crate::error::{EngineError, EngineResult};
use crate::graph::algorithms::filter_by_degree;
use crate::graph::{build_claim_graph, graph_metrics, CompressedGraph, GraphMetrics, NodeKey};
use detection::{find_maximal_bicliques, Biclique, SearchBudget, SizeBounds};
use metrics::{calculate_cluster_stats, suspicion_score};

/// Options for [`analyze_network`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOptions {
    /// Smallest cluster reported, in nodes (at least 3)
    pub min_clique_size: usize,

    /// Largest cluster reported, in nodes; larger ones are cut to this size
    /// and mark the analysis truncated. Unbounded when absent
    pub max_clique_size: Option<usize>,

    /// Number of clusters returned
    pub top_k: usize,

    /// Only search among nodes with at least this many distinct partners
    pub min_degree: usize,

    /// Divisor for cluster weight in the score; total graph weight when absent
    pub weight_normalization: Option<f64>,

    /// Cap on search branch expansions
    pub max_expansions: Option<usize>,

    /// Wall-clock cap on the search
    pub time_budget_ms: Option<u64>,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            min_clique_size: 3,
            max_clique_size: None,
            top_k: 10,
            min_degree: 0,
            weight_normalization: None,
            max_expansions: None,
            time_budget_ms: None,
        }
    }
}

impl NetworkOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_clique_size < 3 {
            return Err(EngineError::invalid("min_clique_size", "must be at least 3"));
        }
        if let Some(max) = self.max_clique_size {
            if max < self.min_clique_size {
                return Err(EngineError::invalid(
                    "max_clique_size",
                    "must not be smaller than min_clique_size",
                ));
            }
        }
        if let Some(norm) = self.weight_normalization {
            if !(norm.is_finite() && norm > 0.0) {
                return Err(EngineError::invalid("weight_normalization", "must be a positive number"));
            }
        }
        Ok(())
    }
}

/// A densely connected group of patients and providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousCluster {
    /// Sorted ascending, patients before providers
    pub members: Vec<NodeKey>,
    pub patients: usize,
    pub providers: usize,
    /// Claim amount summed over internal edges
    pub total_weight: f64,
    pub claim_count: u64,
    pub internal_edges: usize,
    pub density: f64,
    pub score: f64,
}

/// Result of one network analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAnalysis {
    pub metrics: GraphMetrics,
    /// Top clusters, best first
    pub clusters: Vec<SuspiciousCluster>,
    /// Qualifying clusters found before the top-k cut
    pub cliques_found: usize,
    /// The search budget ran out or `max_clique_size` cut clusters short;
    /// clusters are the best found so far
    pub truncated: bool,
}

/// Build the patient–provider graph, measure it and rank suspicious clusters
pub fn analyze_network(table: &ClaimTable, options: &NetworkOptions) -> EngineResult<NetworkAnalysis> {
    options.validate()?;

    let graph = build_claim_graph(table);
    let metrics = graph_metrics(&graph);

    log::info!(
        "Claim graph: {} nodes, {} edges, {} component(s)",
        metrics.node_count,
        metrics.edge_count,
        metrics.connected_components
    );

    if graph.node_count < 3 {
        return Ok(NetworkAnalysis {
            metrics,
            clusters: Vec::new(),
            cliques_found: 0,
            truncated: false,
        });
    }

    let search_graph: Cow<CompressedGraph> = if options.min_degree > 1 {
        Cow::Owned(filter_by_degree(&graph, options.min_degree))
    } else {
        Cow::Borrowed(&graph)
    };

    let bounds = SizeBounds {
        min: options.min_clique_size,
        max: options.max_clique_size,
    };
    let mut budget = SearchBudget::new(
        options.time_budget_ms.map(Duration::from_millis),
        options.max_expansions,
    );
    let (bicliques, truncated) = find_maximal_bicliques(&search_graph, bounds, &mut budget);

    let normalization = options.weight_normalization.unwrap_or(metrics.total_weight);
    let mut clusters: Vec<SuspiciousCluster> = bicliques
        .iter()
        .map(|biclique| to_cluster(&search_graph, biclique, normalization))
        .collect();
    let cliques_found = clusters.len();

    clusters.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.members.cmp(&b.members)));
    clusters.truncate(options.top_k);

    log::info!(
        "Found {} suspicious cluster(s) in {} expansions, keeping top {}",
        cliques_found,
        budget.expansions(),
        clusters.len()
    );

    Ok(NetworkAnalysis {
        metrics,
        clusters,
        cliques_found,
        truncated,
    })
}

fn to_cluster(graph: &CompressedGraph, biclique: &Biclique, normalization: f64) -> SuspiciousCluster {
    let nodes = biclique.members();
    let stats = calculate_cluster_stats(graph, &nodes);

    let mut members: Vec<NodeKey> = nodes.iter().map(|&n| graph.key(n as usize)).collect();
    members.sort();

    SuspiciousCluster {
        members,
        patients: stats.patients,
        providers: stats.providers,
        total_weight: stats.total_weight,
        claim_count: stats.claim_count,
        internal_edges: stats.internal_edges,
        density: stats.density,
        score: suspicion_score(&stats, normalization),
    }
}
