//! Configuration management for the fraud signal engine

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::anomaly::MethodConfig;
use crate::cluster::NetworkOptions;
use crate::data::preprocessing::{filter_claims, ClaimFilter};
use crate::data::ClaimTable;

/// Analysis configuration, loadable from JSON and overridable from the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Anomaly methods to run, each at most once
    pub methods: Vec<MethodConfig>,

    /// Relationship graph options
    pub network: NetworkOptions,

    /// Number of top-ranked claims written to the top anomalies report
    pub top_n: usize,

    /// Drop unusable rows when loading instead of failing
    pub sanitize: bool,

    /// Restrict analysis to matching claims
    pub filter: Option<ClaimFilter>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            methods: vec![MethodConfig::zscore(3.0), MethodConfig::ensemble(0.05)],
            network: NetworkOptions::default(),
            top_n: 10,
            sanitize: false,
            filter: None,
        }
    }
}

impl Config {
    /// Read a configuration file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Apply the configured filter; row indices of the result refer to the
    /// filtered table
    pub fn select_claims(&self, table: ClaimTable) -> ClaimTable {
        match &self.filter {
            Some(filter) if !filter.is_empty() => {
                let selected = filter_claims(&table, filter);
                log::info!("Filter selected {} of {} claims", selected.len(), table.len());
                selected
            }
            _ => table,
        }
    }

    /// Apply the ensemble seed to every configured ensemble method
    pub fn set_seed(&mut self, seed: u64) {
        for method in self.methods.iter_mut() {
            method.seed = Some(seed);
        }
    }
}
