//! Cluster statistics and metrics

use std::collections::HashSet;

use crate::graph::{CompressedGraph, NodeKind};

/// Edge totals inside a set of nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterStats {
    pub patients: usize,
    pub providers: usize,
    pub internal_edges: usize,
    pub total_weight: f64,
    pub claim_count: u64,
    pub density: f64,
}

/// Calculate internal edge totals and density for a set of nodes.
///
/// Density is internal edges over the patient × provider pairs the members
/// could form; a member set without both kinds has density 0.
pub fn calculate_cluster_stats(graph: &CompressedGraph, members: &[u32]) -> ClusterStats {
    let member_set: HashSet<u32> = members.iter().copied().collect();

    let mut patients = 0;
    let mut providers = 0;
    let mut internal_edges = 0;
    let mut total_weight = 0.0;
    let mut claim_count = 0;

    for &node in members {
        if graph.kind(node as usize) == NodeKind::Provider {
            providers += 1;
            continue;
        }
        patients += 1;

        // Walk edges from the patient side only so each edge counts once
        let node = node as usize;
        for (target, edge) in graph.neighbors(node).iter().zip(graph.neighbor_edges(node)) {
            if member_set.contains(target) {
                internal_edges += 1;
                total_weight += edge.weight;
                claim_count += u64::from(edge.claims);
            }
        }
    }

    let possible_edges = patients * providers;
    let density = if possible_edges > 0 {
        internal_edges as f64 / possible_edges as f64
    } else {
        0.0
    };

    ClusterStats {
        patients,
        providers,
        internal_edges,
        total_weight,
        claim_count,
        density,
    }
}

/// `(internal weight / normalization) * density`; 0 without a positive
/// normalization
pub fn suspicion_score(stats: &ClusterStats, normalization: f64) -> f64 {
    if normalization > 0.0 && normalization.is_finite() {
        stats.total_weight / normalization * stats.density
    } else {
        0.0
    }
}
