//! Graph construction module

use std::collections::HashMap;

use crate::data::ClaimTable;
use crate::graph::compressed::{EdgeStats, NodeKey};
use crate::graph::CompressedGraph;

/// Builder for incrementally constructing a CompressedGraph from claims
pub struct GraphBuilder {
    /// Mapping from node identity to internal index
    key_to_index: HashMap<NodeKey, u32>,

    /// Node identities in order of first sight
    nodes: Vec<NodeKey>,

    /// Distinct neighbours of each node
    adjacency_lists: Vec<Vec<u32>>,

    /// Accumulated claims per (patient index, provider index)
    edges: HashMap<(u32, u32), EdgeStats>,
}

impl GraphBuilder {
    /// Create a new graph builder with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            key_to_index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            adjacency_lists: Vec::with_capacity(capacity),
            edges: HashMap::with_capacity(capacity),
        }
    }

    /// Get or create the node index for the given key
    pub fn get_or_create_node(&mut self, key: NodeKey) -> u32 {
        if let Some(&idx) = self.key_to_index.get(&key) {
            return idx;
        }

        let idx = self.nodes.len() as u32;
        self.key_to_index.insert(key, idx);
        self.nodes.push(key);
        self.adjacency_lists.push(Vec::new());

        idx
    }

    /// Record one claim between a patient and a provider
    pub fn add_claim(&mut self, patient_id: i64, provider_id: i64, amount: f64) {
        let patient = self.get_or_create_node(NodeKey::patient(patient_id));
        let provider = self.get_or_create_node(NodeKey::provider(provider_id));

        let stats = self.edges.entry((patient, provider)).or_insert_with(|| {
            self.adjacency_lists[patient as usize].push(provider);
            self.adjacency_lists[provider as usize].push(patient);
            EdgeStats::default()
        });
        stats.weight += amount;
        stats.claims += 1;
    }

    /// Build the compressed graph
    pub fn build(mut self) -> CompressedGraph {
        let node_count = self.nodes.len();
        let edge_count = self.edges.len();
        let mut graph = CompressedGraph::with_capacity(node_count, edge_count);

        graph.offsets.push(0);
        let mut offset = 0;
        for (node, list) in self.adjacency_lists.iter_mut().enumerate() {
            // Sort for binary search efficiency
            list.sort_unstable();

            for &other in list.iter() {
                let key = if self.nodes[node] < self.nodes[other as usize] {
                    (node as u32, other)
                } else {
                    (other, node as u32)
                };
                graph.neighbors.push(other);
                graph.edges.push(self.edges.get(&key).copied().unwrap_or_default());
            }

            offset += list.len() as u32;
            graph.offsets.push(offset);
        }

        graph.node_count = node_count;
        graph.nodes = self.nodes;

        graph
    }
}

/// Build the patient–provider graph for a claim table in one pass
pub fn build_claim_graph(table: &ClaimTable) -> CompressedGraph {
    let mut builder = GraphBuilder::with_capacity(table.len());
    for claim in table {
        builder.add_claim(claim.patient_id, claim.provider_id, claim.claim_amount);
    }

    let graph = builder.build();
    log::debug!(
        "Built claim graph with {} nodes and {} edges from {} claims",
        graph.node_count,
        graph.edge_count(),
        table.len()
    );

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ClaimRecord;
    use crate::graph::compressed::NodeKind;

    #[test]
    fn test_duplicate_claims_accumulate() {
        let table = ClaimTable::new(vec![
            ClaimRecord::new(101, 501, 1000.0, "I10"),
            ClaimRecord::new(101, 501, 500.0, "I10"),
            ClaimRecord::new(101, 502, 2000.0, "E11"),
        ])
        .unwrap();
        let graph = build_claim_graph(&table);

        assert_eq!(graph.node_count, 3);
        assert_eq!(graph.edge_count(), 2);

        let patient = graph.index_of(&NodeKey::patient(101)).unwrap();
        let provider = graph.index_of(&NodeKey::provider(501)).unwrap() as u32;
        let edge = graph.edge(patient, provider).unwrap();
        assert_eq!(edge.weight, 1500.0);
        assert_eq!(edge.claims, 2);

        // Both directions see the same edge data
        let back = graph.edge(provider as usize, patient as u32).unwrap();
        assert_eq!(back, edge);
        assert_eq!(graph.total_claims(), 3);
        assert_eq!(graph.total_weight(), 3500.0);
    }

    #[test]
    fn test_same_raw_id_on_both_sides() {
        let table = ClaimTable::new(vec![ClaimRecord::new(7, 7, 10.0, "I10")]).unwrap();
        let graph = build_claim_graph(&table);

        assert_eq!(graph.node_count, 2);
        assert_eq!(graph.count_of(NodeKind::Patient), 1);
        assert_eq!(graph.count_of(NodeKind::Provider), 1);
        assert_eq!(graph.key(0).to_string(), "Patient_7");
        assert_eq!(graph.key(1).to_string(), "Provider_7");
    }

    #[test]
    fn test_empty_table() {
        let graph = build_claim_graph(&ClaimTable::empty());
        assert_eq!(graph.node_count, 0);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.offsets, vec![0]);
    }

    #[test]
    fn test_neighbor_lists_sorted() {
        let table = ClaimTable::new(vec![
            ClaimRecord::new(1, 30, 1.0, "I10"),
            ClaimRecord::new(1, 10, 1.0, "I10"),
            ClaimRecord::new(1, 20, 1.0, "I10"),
        ])
        .unwrap();
        let graph = build_claim_graph(&table);
        assert_eq!(graph.neighbors(0), &[1, 2, 3]);
        assert_eq!(graph.degree(0), 3);
    }
}
