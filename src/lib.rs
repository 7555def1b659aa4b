//! Core library functions for the fraud signal engine

pub mod config;
pub mod error;
pub mod data;
pub mod anomaly;
pub mod graph;
pub mod cluster;
pub mod storage;

pub use anomaly::{
    anomaly_summary, score_anomalies, top_anomalies, AnomalyResult, AnomalySummary, MethodConfig,
    MethodKind,
};
pub use cluster::{analyze_network, NetworkAnalysis, NetworkOptions, SuspiciousCluster};
pub use config::Config;
pub use data::{ClaimRecord, ClaimStatistics, ClaimTable};
pub use error::{EngineError, EngineResult};
pub use graph::{GraphMetrics, NodeKey, NodeKind};

pub use anyhow::{Result, anyhow};
