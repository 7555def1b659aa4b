//! Multi-method anomaly scoring over claim tables

pub mod isolation;
pub mod methods;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::ClaimTable;
use crate::error::{EngineError, EngineResult};
pub use isolation::{Feature, IsolationForestScorer};
pub use methods::{Cutoff, Entity, FrequencyScorer, ThresholdScorer, ZScoreScorer};

/// The detection methods the scorer knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Threshold,
    ZScore,
    Ensemble,
    Frequency,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::ZScore => "zscore",
            Self::Ensemble => "ensemble",
            Self::Frequency => "frequency",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodKind {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threshold" => Ok(Self::Threshold),
            "zscore" | "z-score" => Ok(Self::ZScore),
            "ensemble" | "isolation_forest" => Ok(Self::Ensemble),
            "frequency" => Ok(Self::Frequency),
            _ => Err(EngineError::UnknownMethod(s.to_string())),
        }
    }
}

/// Score and flag a single method assigns to one claim
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Normalized to [0, 1]
    pub score: f64,
    pub flagged: bool,
}

impl Detection {
    pub fn new(score: f64, flagged: bool) -> Self {
        Self { score, flagged }
    }
}

/// A detection method that can be run over a whole claim table.
///
/// Returns one entry per row; `None` means the method has nothing to say
/// about that row and it is left out of the combination.
pub trait ClaimScorer: Send + Sync {
    fn kind(&self) -> MethodKind;

    fn score(&self, table: &ClaimTable) -> Vec<Option<Detection>>;
}

fn default_weight() -> f64 {
    1.0
}

/// Caller-facing configuration of one detection method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    /// "threshold", "zscore", "ensemble" or "frequency"
    pub method: String,

    /// Cutoff amount, z threshold, anomaly fraction or claim count
    #[serde(default)]
    pub parameter: Option<f64>,

    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Threshold method only: derive the cutoff from this percentile
    #[serde(default)]
    pub percentile: Option<f64>,

    /// Frequency method only: sliding window length
    #[serde(default)]
    pub window_days: Option<u32>,

    /// Frequency method only: count claims per patient or per provider
    #[serde(default)]
    pub entity: Option<Entity>,

    /// Ensemble method only
    #[serde(default)]
    pub features: Option<Vec<Feature>>,

    /// Ensemble method only
    #[serde(default)]
    pub seed: Option<u64>,
}

impl MethodConfig {
    fn named(kind: MethodKind, parameter: Option<f64>) -> Self {
        Self {
            method: kind.as_str().to_string(),
            parameter,
            weight: default_weight(),
            percentile: None,
            window_days: None,
            entity: None,
            features: None,
            seed: None,
        }
    }

    pub fn threshold(cutoff: f64) -> Self {
        Self::named(MethodKind::Threshold, Some(cutoff))
    }

    pub fn threshold_percentile(percentile: f64) -> Self {
        let mut config = Self::named(MethodKind::Threshold, None);
        config.percentile = Some(percentile);
        config
    }

    pub fn zscore(threshold: f64) -> Self {
        Self::named(MethodKind::ZScore, Some(threshold))
    }

    pub fn ensemble(contamination: f64) -> Self {
        Self::named(MethodKind::Ensemble, Some(contamination))
    }

    pub fn frequency(max_claims: f64, window_days: u32) -> Self {
        let mut config = Self::named(MethodKind::Frequency, Some(max_claims));
        config.window_days = Some(window_days);
        config
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn kind(&self) -> EngineResult<MethodKind> {
        self.method.parse()
    }

    /// Validate the configuration and build its scorer
    pub fn build(&self) -> EngineResult<Box<dyn ClaimScorer>> {
        let kind = self.kind()?;
        let name = |field: &str| format!("{}.{}", kind, field);

        if !(self.weight.is_finite() && self.weight > 0.0) {
            return Err(EngineError::invalid(&name("weight"), "must be a positive number"));
        }

        let positive = |value: Option<f64>, default: Option<f64>| -> EngineResult<f64> {
            match value.or(default) {
                Some(v) if v.is_finite() && v > 0.0 => Ok(v),
                Some(_) => Err(EngineError::invalid(&name("parameter"), "must be a positive number")),
                None => Err(EngineError::invalid(&name("parameter"), "is required")),
            }
        };

        let scorer: Box<dyn ClaimScorer> = match kind {
            MethodKind::Threshold => {
                let cutoff = match (self.parameter, self.percentile) {
                    (Some(_), Some(_)) => {
                        return Err(EngineError::invalid(
                            &name("percentile"),
                            "cannot be combined with a fixed cutoff",
                        ))
                    }
                    (None, Some(p)) if p > 0.0 && p <= 100.0 => Cutoff::Percentile(p),
                    (None, Some(_)) => {
                        return Err(EngineError::invalid(&name("percentile"), "must be in (0, 100]"))
                    }
                    (parameter, None) => Cutoff::Fixed(positive(parameter, None)?),
                };
                Box::new(ThresholdScorer::new(cutoff))
            }
            MethodKind::ZScore => Box::new(ZScoreScorer::new(positive(self.parameter, Some(3.0))?)),
            MethodKind::Ensemble => {
                let contamination = positive(self.parameter, Some(0.05))?;
                if contamination > 0.5 {
                    return Err(EngineError::invalid(&name("parameter"), "must be in (0, 0.5]"));
                }
                Box::new(IsolationForestScorer::new(
                    contamination,
                    self.features.clone().unwrap_or_default(),
                    self.seed.unwrap_or(isolation::DEFAULT_SEED),
                ))
            }
            MethodKind::Frequency => {
                let window_days = self.window_days.unwrap_or(1);
                if window_days == 0 {
                    return Err(EngineError::invalid(&name("window_days"), "must be at least 1"));
                }
                Box::new(FrequencyScorer::new(
                    positive(self.parameter, None)?,
                    i64::from(window_days),
                    self.entity.unwrap_or_default(),
                ))
            }
        };

        Ok(scorer)
    }
}

/// Parses `name[:parameter[:weight]]`, e.g. `zscore:2.5` or `threshold:1000:2`
impl FromStr for MethodConfig {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let mut parts = s.split(':');
        let kind: MethodKind = parts.next().unwrap_or_default().parse()?;

        let mut number = |field: &str| -> EngineResult<Option<f64>> {
            parts
                .next()
                .filter(|p| !p.trim().is_empty())
                .map(|p| {
                    p.trim()
                        .parse::<f64>()
                        .map_err(|_| EngineError::invalid(&format!("{}.{}", kind, field), "not a number"))
                })
                .transpose()
        };

        let mut config = Self::named(kind, number("parameter")?);
        if let Some(weight) = number("weight")? {
            config.weight = weight;
        }
        Ok(config)
    }
}

/// Anomaly verdict for one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub row_index: usize,
    /// Normalized score per method that scored this row
    pub scores: BTreeMap<MethodKind, f64>,
    /// Flag per method that scored this row
    pub flags: BTreeMap<MethodKind, bool>,
    pub combined_score: f64,
    /// 1-based position by descending combined score
    pub rank: usize,
    /// Flagged by at least one method
    pub is_anomaly: bool,
}

/// A scorer's output with the weight it carries in the combination
struct WeightedRun {
    kind: MethodKind,
    weight: f64,
    detections: Vec<Option<Detection>>,
}

/// Score every claim with the configured methods and rank the results.
///
/// Results come back in row order. All configurations are validated before
/// any scoring happens.
pub fn score_anomalies(table: &ClaimTable, configs: &[MethodConfig]) -> EngineResult<Vec<AnomalyResult>> {
    if configs.is_empty() {
        return Err(EngineError::invalid("methods", "at least one method is required"));
    }

    let mut scorers = Vec::with_capacity(configs.len());
    for config in configs {
        let scorer = config.build()?;
        if scorers.iter().any(|(s, _): &(Box<dyn ClaimScorer>, f64)| s.kind() == scorer.kind()) {
            return Err(EngineError::DuplicateMethod(scorer.kind().to_string()));
        }
        scorers.push((scorer, config.weight));
    }

    if table.is_empty() {
        return Ok(Vec::new());
    }

    log::info!(
        "Scoring {} claims with {} method(s)",
        table.len(),
        scorers.len()
    );

    let runs: Vec<WeightedRun> = scorers
        .iter()
        .map(|(scorer, weight)| WeightedRun {
            kind: scorer.kind(),
            weight: *weight,
            detections: scorer.score(table),
        })
        .collect();

    let results = combine(table.len(), &runs);

    log::info!(
        "Flagged {} of {} claims",
        results.iter().filter(|r| r.is_anomaly).count(),
        results.len()
    );

    Ok(results)
}

/// Weighted mean of per-method scores, then rank assignment
fn combine(rows: usize, runs: &[WeightedRun]) -> Vec<AnomalyResult> {
    let mut results: Vec<AnomalyResult> = (0..rows)
        .map(|row| {
            let mut scores = BTreeMap::new();
            let mut flags = BTreeMap::new();
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;

            for run in runs {
                if let Some(Some(detection)) = run.detections.get(row) {
                    scores.insert(run.kind, detection.score);
                    flags.insert(run.kind, detection.flagged);
                    weighted_sum += run.weight * detection.score;
                    weight_total += run.weight;
                }
            }

            let combined_score = if weight_total > 0.0 {
                (weighted_sum / weight_total).clamp(0.0, 1.0)
            } else {
                0.0
            };

            AnomalyResult {
                row_index: row,
                is_anomaly: flags.values().any(|&f| f),
                scores,
                flags,
                combined_score,
                rank: 0,
            }
        })
        .collect();

    // Stable sort keeps lower row indices first among equal scores
    let mut order: Vec<usize> = (0..rows).collect();
    order.sort_by(|&a, &b| results[b].combined_score.total_cmp(&results[a].combined_score));
    for (position, &row) in order.iter().enumerate() {
        results[row].rank = position + 1;
    }

    results
}

/// The `n` highest-ranked results, best first
pub fn top_anomalies(results: &[AnomalyResult], n: usize) -> Vec<&AnomalyResult> {
    let mut ranked: Vec<&AnomalyResult> = results.iter().collect();
    ranked.sort_by_key(|r| r.rank);
    ranked.truncate(n.min(results.len()));
    ranked
}

/// Structured overview of a scoring run, suitable for handing to an
/// explanation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_claims: usize,
    pub anomalies_detected: usize,
    pub anomaly_percentage: f64,
    pub normal_claims: usize,
    pub avg_amount_anomaly: f64,
    pub avg_amount_normal: f64,
    pub flagged_by_method: BTreeMap<MethodKind, usize>,
}

pub fn anomaly_summary(table: &ClaimTable, results: &[AnomalyResult]) -> AnomalySummary {
    let mean = |amounts: &[f64]| {
        if amounts.is_empty() {
            0.0
        } else {
            amounts.iter().sum::<f64>() / amounts.len() as f64
        }
    };

    let (anomalous, normal): (Vec<&AnomalyResult>, Vec<&AnomalyResult>) =
        results.iter().partition(|r| r.is_anomaly);
    let amounts_of = |rows: &[&AnomalyResult]| -> Vec<f64> {
        rows.iter()
            .filter_map(|r| table.get(r.row_index))
            .map(|claim| claim.claim_amount)
            .collect()
    };

    let mut flagged_by_method = BTreeMap::new();
    for result in results {
        for (&kind, &flag) in &result.flags {
            *flagged_by_method.entry(kind).or_insert(0) += usize::from(flag);
        }
    }

    let total_claims = results.len();
    AnomalySummary {
        total_claims,
        anomalies_detected: anomalous.len(),
        anomaly_percentage: if total_claims > 0 {
            anomalous.len() as f64 / total_claims as f64 * 100.0
        } else {
            0.0
        },
        normal_claims: normal.len(),
        avg_amount_anomaly: mean(&amounts_of(&anomalous)),
        avg_amount_normal: mean(&amounts_of(&normal)),
        flagged_by_method,
    }
}
