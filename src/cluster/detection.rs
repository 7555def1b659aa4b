//! Bounded maximal biclique search
//!
//! A bipartite graph has no triangles, so the dense groups worth reporting
//! are complete bipartite subgraphs: a set of patients who all billed the
//! same set of providers. The search is a Bron–Kerbosch style
//! branch-and-bound over providers (MBEA), run separately inside each
//! connected component, with the patient side kept as the common
//! neighbourhood of the providers chosen so far.

use std::time::{Duration, Instant};

use crate::graph::algorithms::connected_components;
use crate::graph::{CompressedGraph, NodeKind};

/// Caller-supplied limits on how much searching may happen
#[derive(Debug, Clone)]
pub struct SearchBudget {
    deadline: Option<Instant>,
    max_expansions: Option<usize>,
    expansions: usize,
    exhausted: bool,
}

impl SearchBudget {
    pub fn new(time_budget: Option<Duration>, max_expansions: Option<usize>) -> Self {
        Self {
            deadline: time_budget.map(|budget| Instant::now() + budget),
            max_expansions,
            expansions: 0,
            exhausted: false,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Charge one branch expansion; false once the budget is spent
    fn try_expand(&mut self) -> bool {
        if self.exhausted {
            return false;
        }

        let over_steps = self.max_expansions.map_or(false, |max| self.expansions >= max);
        let over_time = self.deadline.map_or(false, |deadline| Instant::now() >= deadline);
        if over_steps || over_time {
            self.exhausted = true;
            return false;
        }

        self.expansions += 1;
        true
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn expansions(&self) -> usize {
        self.expansions
    }
}

/// Size limits on reported bicliques, counted in nodes
#[derive(Debug, Clone, Copy)]
pub struct SizeBounds {
    pub min: usize,
    pub max: Option<usize>,
}

/// A complete bipartite subgraph, both sides ascending by node index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Biclique {
    pub patients: Vec<u32>,
    pub providers: Vec<u32>,
}

impl Biclique {
    pub fn size(&self) -> usize {
        self.patients.len() + self.providers.len()
    }

    pub fn members(&self) -> Vec<u32> {
        let mut members: Vec<u32> = self.patients.iter().chain(&self.providers).copied().collect();
        members.sort_unstable();
        members
    }
}

struct BicliqueSearch<'a> {
    graph: &'a CompressedGraph,
    bounds: SizeBounds,
    budget: &'a mut SearchBudget,
    found: Vec<Biclique>,
    /// A biclique or branch went past the size bound
    capped: bool,
}

impl<'a> BicliqueSearch<'a> {
    /// Number of `left` nodes adjacent to `node`
    fn common_neighbors(&self, node: u32, left: &[u32]) -> usize {
        left.iter()
            .filter(|&&u| self.graph.has_edge(u as usize, node))
            .count()
    }

    fn report(&mut self, left: &[u32], right: &[u32]) {
        let size = left.len() + right.len();
        if size < self.bounds.min {
            return;
        }

        let mut patients = left.to_vec();
        let mut providers = right.to_vec();
        providers.sort_unstable();

        // Oversized bicliques are cut down to their lowest-index members,
        // keeping at least one provider so the result stays complete bipartite
        let mut capped = false;
        if let Some(max) = self.bounds.max.filter(|&max| size > max) {
            patients.truncate(max.saturating_sub(1).max(1));
            providers.truncate(max.saturating_sub(patients.len()).max(1));
            self.capped = true;
            capped = true;
        }

        let biclique = Biclique { patients, providers };
        if capped && self.found.contains(&biclique) {
            return;
        }
        self.found.push(biclique);
    }

    /// Whether extending `right` can still produce a biclique within bounds
    fn can_grow(&self, right: &[u32]) -> bool {
        // A deeper branch adds at least one provider and keeps at least one patient
        self.bounds.max.map_or(true, |max| right.len() + 2 <= max)
    }

    /// Expand the branch with patient side `left`, chosen providers `right`,
    /// remaining `candidates` and already-processed `excluded` providers
    fn expand(&mut self, left: &[u32], right: &[u32], candidates: &[u32], mut excluded: Vec<u32>) {
        for (i, &x) in candidates.iter().enumerate() {
            if !self.budget.try_expand() {
                return;
            }

            let new_left: Vec<u32> = left
                .iter()
                .copied()
                .filter(|&u| self.graph.has_edge(u as usize, x))
                .collect();
            let mut new_right = right.to_vec();
            new_right.push(x);

            // A processed provider covering all of new_left means this
            // biclique was already reported from that provider's branch
            let mut new_excluded = Vec::new();
            let mut maximal = true;
            for &v in &excluded {
                let common = self.common_neighbors(v, &new_left);
                if common == new_left.len() {
                    maximal = false;
                    break;
                }
                if common > 0 {
                    new_excluded.push(v);
                }
            }

            if maximal {
                let mut new_candidates = Vec::new();
                for &v in &candidates[i + 1..] {
                    let common = self.common_neighbors(v, &new_left);
                    if common == new_left.len() {
                        new_right.push(v);
                    } else if common > 0 {
                        new_candidates.push(v);
                    }
                }

                self.report(&new_left, &new_right);

                if !new_candidates.is_empty() {
                    if self.can_grow(&new_right) {
                        self.expand(&new_left, &new_right, &new_candidates, new_excluded);
                    } else {
                        self.capped = true;
                    }
                }
            }

            excluded.push(x);
        }
    }
}

/// Enumerate maximal bicliques within the size bounds.
///
/// Providers are tried in ascending degree order (ties by node index) so
/// low-degree providers are settled first and the output order is
/// reproducible. A maximal biclique larger than `bounds.max` is reported as
/// its first `max` members. Returns the bicliques found and whether the
/// result is partial, either because the budget ran out or because the size
/// bound cut bicliques or branches.
pub fn find_maximal_bicliques(
    graph: &CompressedGraph,
    bounds: SizeBounds,
    budget: &mut SearchBudget,
) -> (Vec<Biclique>, bool) {
    let mut search = BicliqueSearch {
        graph,
        bounds,
        budget,
        found: Vec::new(),
        capped: false,
    };

    for component in connected_components(graph) {
        if component.len() < bounds.min {
            continue;
        }

        let (patients, mut providers): (Vec<u32>, Vec<u32>) = component
            .iter()
            .partition(|&&node| graph.kind(node as usize) == NodeKind::Patient);
        if patients.is_empty() || providers.is_empty() {
            continue;
        }
        providers.sort_by_key(|&node| (graph.degree(node as usize), node));

        search.expand(&patients, &[], &providers, Vec::new());

        if search.budget.exhausted() {
            log::warn!(
                "Clique search budget exhausted after {} expansions; returning partial results",
                search.budget.expansions()
            );
            break;
        }
    }

    if search.capped {
        log::warn!("Bicliques above {:?} nodes were cut to the size bound", bounds.max);
    }

    let truncated = search.budget.exhausted() || search.capped;
    (search.found, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClaimRecord, ClaimTable};
    use crate::graph::{build_claim_graph, NodeKey};

    fn graph_of(pairs: &[(i64, i64)]) -> CompressedGraph {
        let records = pairs
            .iter()
            .map(|&(patient, provider)| ClaimRecord::new(patient, provider, 100.0, "I10"))
            .collect();
        build_claim_graph(&ClaimTable::new(records).unwrap())
    }

    fn keys(graph: &CompressedGraph, nodes: &[u32]) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = nodes.iter().map(|&n| graph.key(n as usize)).collect();
        keys.sort();
        keys
    }

    fn bounds(min: usize, max: Option<usize>) -> SizeBounds {
        SizeBounds { min, max }
    }

    #[test]
    fn test_complete_bipartite_is_one_biclique() {
        let graph = graph_of(&[(1, 10), (1, 11), (2, 10), (2, 11), (3, 10), (3, 11)]);
        let (found, truncated) = find_maximal_bicliques(&graph, bounds(3, None), &mut SearchBudget::unlimited());

        assert!(!truncated);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].size(), 5);
        assert_eq!(found[0].patients.len(), 3);
        assert_eq!(found[0].providers.len(), 2);
    }

    #[test]
    fn test_overlapping_bicliques() {
        // {1,2} x {10,11} and {2,3} x {11,12} share patient 2 and provider 11
        let graph = graph_of(&[(1, 10), (1, 11), (2, 10), (2, 11), (2, 12), (3, 11), (3, 12)]);
        let (found, _) = find_maximal_bicliques(&graph, bounds(3, None), &mut SearchBudget::unlimited());

        let mut sets: Vec<Vec<NodeKey>> = found.iter().map(|b| keys(&graph, &b.members())).collect();
        sets.sort();

        let expected_a = vec![
            NodeKey::patient(1),
            NodeKey::patient(2),
            NodeKey::provider(10),
            NodeKey::provider(11),
        ];
        let expected_b = vec![
            NodeKey::patient(2),
            NodeKey::patient(3),
            NodeKey::provider(11),
            NodeKey::provider(12),
        ];
        assert!(sets.contains(&expected_a));
        assert!(sets.contains(&expected_b));

        // Stars around patient 2 and provider 11 are maximal too
        assert!(sets.contains(&vec![
            NodeKey::patient(2),
            NodeKey::provider(10),
            NodeKey::provider(11),
            NodeKey::provider(12),
        ]));
        assert!(sets.contains(&vec![
            NodeKey::patient(1),
            NodeKey::patient(2),
            NodeKey::patient(3),
            NodeKey::provider(11),
        ]));
        assert_eq!(sets.len(), 4);
    }

    #[test]
    fn test_no_duplicates_reported() {
        let graph = graph_of(&[(1, 10), (1, 11), (1, 12), (2, 10), (2, 11), (3, 11), (3, 12)]);
        let (found, _) = find_maximal_bicliques(&graph, bounds(3, None), &mut SearchBudget::unlimited());

        let mut sets: Vec<Vec<u32>> = found.iter().map(|b| b.members()).collect();
        let before = sets.len();
        sets.sort();
        sets.dedup();
        assert_eq!(sets.len(), before);
    }

    #[test]
    fn test_max_size_bound_reports_capped_biclique() {
        let graph = graph_of(&[(1, 10), (1, 11), (2, 10), (2, 11), (3, 10), (3, 11)]);
        let (found, truncated) = find_maximal_bicliques(&graph, bounds(3, Some(4)), &mut SearchBudget::unlimited());

        assert!(truncated);
        assert_eq!(found.len(), 1);
        assert_eq!(
            keys(&graph, &found[0].members()),
            vec![
                NodeKey::patient(1),
                NodeKey::patient(2),
                NodeKey::patient(3),
                NodeKey::provider(10),
            ]
        );
        for &patient in &found[0].patients {
            for &provider in &found[0].providers {
                assert!(graph.has_edge(patient as usize, provider));
            }
        }
    }

    #[test]
    fn test_max_size_bound_keeps_a_provider() {
        // One provider billed by four patients
        let graph = graph_of(&[(1, 10), (2, 10), (3, 10), (4, 10)]);
        let (found, truncated) = find_maximal_bicliques(&graph, bounds(3, Some(3)), &mut SearchBudget::unlimited());

        assert!(truncated);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].patients.len(), 2);
        assert_eq!(found[0].providers.len(), 1);
    }

    #[test]
    fn test_bicliques_within_bound_not_truncated() {
        let graph = graph_of(&[(1, 10), (1, 11), (2, 10), (2, 11), (3, 10), (3, 11)]);
        let (found, truncated) = find_maximal_bicliques(&graph, bounds(3, Some(5)), &mut SearchBudget::unlimited());
        assert!(!truncated);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].size(), 5);
    }

    #[test]
    fn test_single_edge_component_skipped() {
        let graph = graph_of(&[(1, 10), (2, 20)]);
        let (found, truncated) = find_maximal_bicliques(&graph, bounds(3, None), &mut SearchBudget::unlimited());
        assert!(found.is_empty());
        assert!(!truncated);
    }

    #[test]
    fn test_step_budget_truncates() {
        let mut pairs = Vec::new();
        for patient in 0..8 {
            for provider in 100..108 {
                if (patient + provider) % 3 != 0 {
                    pairs.push((patient, provider));
                }
            }
        }
        let graph = graph_of(&pairs);

        let mut budget = SearchBudget::new(None, Some(2));
        let (found, truncated) = find_maximal_bicliques(&graph, bounds(3, None), &mut budget);
        assert!(truncated);
        assert_eq!(budget.expansions(), 2);
        assert!(found.len() <= 2);

        let (all, truncated) = find_maximal_bicliques(&graph, bounds(3, None), &mut SearchBudget::unlimited());
        assert!(!truncated);
        assert!(all.len() > found.len());
    }
}
