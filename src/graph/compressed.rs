//! Compressed adjacency representation of the patient–provider graph

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the bipartite graph a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Patient,
    Provider,
}

/// Graph node identity: the raw id qualified by its side, so patient 7 and
/// provider 7 are different nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: i64,
}

impl NodeKey {
    pub fn patient(id: i64) -> Self {
        Self { kind: NodeKind::Patient, id }
    }

    pub fn provider(id: i64) -> Self {
        Self { kind: NodeKind::Provider, id }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NodeKind::Patient => write!(f, "Patient_{}", self.id),
            NodeKind::Provider => write!(f, "Provider_{}", self.id),
        }
    }
}

/// Accumulated claims between one patient and one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeStats {
    /// Sum of claim amounts
    pub weight: f64,
    /// Number of claims
    pub claims: u32,
}

/// Compressed sparse representation of an undirected weighted graph.
///
/// Every edge is stored in both endpoints' neighbour lists; neighbour lists
/// are sorted so membership checks are binary searches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressedGraph {
    /// Number of nodes in the graph
    pub node_count: usize,

    /// offsets[i] to offsets[i+1] is the neighbour range for node i
    pub offsets: Vec<u32>,

    /// Concatenated neighbour lists
    pub neighbors: Vec<u32>,

    /// Edge data, parallel to `neighbors`
    pub edges: Vec<EdgeStats>,

    /// Node identities by internal index
    pub nodes: Vec<NodeKey>,
}

impl CompressedGraph {
    /// Create an empty graph with pre-allocated capacity
    pub fn with_capacity(node_count: usize, edge_count: usize) -> Self {
        Self {
            node_count: 0,
            offsets: Vec::with_capacity(node_count + 1),
            neighbors: Vec::with_capacity(edge_count * 2),
            edges: Vec::with_capacity(edge_count * 2),
            nodes: Vec::with_capacity(node_count),
        }
    }

    fn range(&self, node: usize) -> std::ops::Range<usize> {
        self.offsets[node] as usize..self.offsets[node + 1] as usize
    }

    /// Neighbours of a node, ascending by index
    pub fn neighbors(&self, node: usize) -> &[u32] {
        &self.neighbors[self.range(node)]
    }

    /// Edge data for the neighbours of a node, parallel to [`Self::neighbors`]
    pub fn neighbor_edges(&self, node: usize) -> &[EdgeStats] {
        &self.edges[self.range(node)]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.range(node).len()
    }

    pub fn has_edge(&self, a: usize, b: u32) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    pub fn edge(&self, a: usize, b: u32) -> Option<EdgeStats> {
        self.neighbors(a)
            .binary_search(&b)
            .ok()
            .map(|pos| self.neighbor_edges(a)[pos])
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.neighbors.len() / 2
    }

    pub fn key(&self, node: usize) -> NodeKey {
        self.nodes[node]
    }

    pub fn kind(&self, node: usize) -> NodeKind {
        self.nodes[node].kind
    }

    pub fn count_of(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|key| key.kind == kind).count()
    }

    /// Internal index of a node, if present
    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.nodes.iter().position(|k| k == key)
    }

    /// Sum of claim amounts over all edges
    pub fn total_weight(&self) -> f64 {
        self.undirected_edges().map(|(_, _, e)| e.weight).sum()
    }

    /// Number of claims over all edges
    pub fn total_claims(&self) -> u64 {
        self.undirected_edges().map(|(_, _, e)| u64::from(e.claims)).sum()
    }

    /// Each undirected edge once, as (lower index, higher index, data)
    pub fn undirected_edges(&self) -> impl Iterator<Item = (usize, u32, EdgeStats)> + '_ {
        (0..self.node_count).flat_map(move |a| {
            self.neighbors(a)
                .iter()
                .zip(self.neighbor_edges(a))
                .filter(move |(&b, _)| (b as usize) > a)
                .map(move |(&b, &e)| (a, b, e))
        })
    }
}
