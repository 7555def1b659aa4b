//! Patient–provider graph representation and algorithms module

pub mod compressed;
pub mod builder;
pub mod algorithms;

pub use algorithms::{graph_metrics, GraphMetrics};
pub use builder::build_claim_graph;
pub use compressed::{CompressedGraph, EdgeStats, NodeKey, NodeKind};
