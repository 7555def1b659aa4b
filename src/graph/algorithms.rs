//! Graph algorithms for analysis

use serde::{Deserialize, Serialize};

use crate::graph::compressed::NodeKind;
use crate::graph::CompressedGraph;

/// Union-Find data structure for connected component analysis
pub struct DisjointSets {
    /// Parent pointers (parent[i] = parent of node i)
    parent: Vec<u32>,

    /// Size of each set (for union by size)
    size: Vec<u32>,
}

impl DisjointSets {
    /// Create a new DisjointSets data structure
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            size: vec![1; size],
        }
    }

    /// Find the root of the set containing x with path compression
    pub fn find(&mut self, x: u32) -> u32 {
        let px = self.parent[x as usize];
        if px != x {
            self.parent[x as usize] = self.find(px);
        }
        self.parent[x as usize]
    }

    /// Union the sets containing x and y
    pub fn union(&mut self, x: u32, y: u32) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return;
        }

        // Attach the smaller tree under the root of the larger one
        if self.size[root_x as usize] > self.size[root_y as usize] {
            self.parent[root_y as usize] = root_x;
            self.size[root_x as usize] += self.size[root_y as usize];
        } else {
            self.parent[root_x as usize] = root_y;
            self.size[root_y as usize] += self.size[root_x as usize];
        }
    }

    /// Get the size of the set containing x
    pub fn size(&mut self, x: u32) -> u32 {
        let root = self.find(x);
        self.size[root as usize]
    }
}

/// Group nodes by connected component.
///
/// Components are ordered by their smallest node index and members are
/// ascending, so the output does not depend on hashing.
pub fn connected_components(graph: &CompressedGraph) -> Vec<Vec<u32>> {
    let mut sets = DisjointSets::new(graph.node_count);
    for (a, b, _) in graph.undirected_edges() {
        sets.union(a as u32, b);
    }

    let mut slot_of_root = vec![usize::MAX; graph.node_count];
    let mut components: Vec<Vec<u32>> = Vec::new();
    for node in 0..graph.node_count as u32 {
        let root = sets.find(node) as usize;
        if slot_of_root[root] == usize::MAX {
            slot_of_root[root] = components.len();
            components.push(Vec::new());
        }
        components[slot_of_root[root]].push(node);
    }

    components
}

/// Whole-graph connectivity metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub patient_count: usize,
    pub provider_count: usize,
    pub edge_count: usize,
    pub claim_count: u64,
    pub total_weight: f64,
    /// Edges over the patient × provider pairs a bipartite graph could hold
    pub density: f64,
    pub avg_degree: f64,
    pub connected_components: usize,
    pub is_connected: bool,
}

pub fn graph_metrics(graph: &CompressedGraph) -> GraphMetrics {
    let patient_count = graph.count_of(NodeKind::Patient);
    let provider_count = graph.count_of(NodeKind::Provider);
    let edge_count = graph.edge_count();

    let possible_edges = patient_count * provider_count;
    let density = if possible_edges > 0 {
        edge_count as f64 / possible_edges as f64
    } else {
        0.0
    };
    let avg_degree = if graph.node_count > 0 {
        2.0 * edge_count as f64 / graph.node_count as f64
    } else {
        0.0
    };
    let components = connected_components(graph).len();

    GraphMetrics {
        node_count: graph.node_count,
        patient_count,
        provider_count,
        edge_count,
        claim_count: graph.total_claims(),
        total_weight: graph.total_weight(),
        density,
        avg_degree,
        connected_components: components,
        is_connected: components == 1,
    }
}

/// Filter a graph to only include nodes with a minimum degree.
///
/// Degrees are taken from the input graph; edges to removed nodes are
/// dropped, so surviving nodes may end up with a lower degree.
pub fn filter_by_degree(graph: &CompressedGraph, min_degree: usize) -> CompressedGraph {
    let pass_filter: Vec<bool> = (0..graph.node_count)
        .map(|node| graph.degree(node) >= min_degree)
        .collect();

    // Create mapping from original to filtered indices
    let mut orig_to_filtered = vec![u32::MAX; graph.node_count];
    let mut filtered_count = 0;
    for node in 0..graph.node_count {
        if pass_filter[node] {
            orig_to_filtered[node] = filtered_count as u32;
            filtered_count += 1;
        }
    }

    let mut filtered = CompressedGraph::with_capacity(filtered_count, graph.edge_count());
    filtered.offsets.push(0);
    let mut offset = 0;

    for node in (0..graph.node_count).filter(|&n| pass_filter[n]) {
        for (&target, &edge) in graph.neighbors(node).iter().zip(graph.neighbor_edges(node)) {
            // Only include edges where both endpoints pass the filter
            if pass_filter[target as usize] {
                filtered.neighbors.push(orig_to_filtered[target as usize]);
                filtered.edges.push(edge);
                offset += 1;
            }
        }
        filtered.offsets.push(offset);
        filtered.nodes.push(graph.key(node));
    }

    filtered.node_count = filtered_count;

    log::debug!(
        "Degree filter (>= {}) kept {} of {} nodes",
        min_degree,
        filtered_count,
        graph.node_count
    );

    filtered
}
