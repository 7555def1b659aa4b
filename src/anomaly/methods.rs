//! Threshold, z-score and claim-frequency scorers

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::anomaly::{ClaimScorer, Detection, MethodKind};
use crate::data::ClaimTable;

/// Cutoff for the threshold method
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cutoff {
    /// Fixed claim amount
    Fixed(f64),
    /// Percentile (0, 100] of the table's claim amounts
    Percentile(f64),
}

/// Flags claims whose amount exceeds a cutoff.
///
/// Score is `amount / cutoff`, capped at 1.0.
#[derive(Debug, Clone)]
pub struct ThresholdScorer {
    cutoff: Cutoff,
}

impl ThresholdScorer {
    pub fn new(cutoff: Cutoff) -> Self {
        Self { cutoff }
    }

    /// Resolve the cutoff amount for a table
    pub fn cutoff_for(&self, table: &ClaimTable) -> f64 {
        match self.cutoff {
            Cutoff::Fixed(amount) => amount,
            Cutoff::Percentile(p) => linear_percentile(table.amounts(), p),
        }
    }
}

/// Percentile with linear interpolation between the closest ranks,
/// `h = (n - 1) * p / 100`
fn linear_percentile(amounts: Vec<f64>, percentile: f64) -> f64 {
    let n = amounts.len();
    if n == 0 {
        return f64::NAN;
    }

    let h = (n - 1) as f64 * percentile / 100.0;
    let mut data = Data::new(amounts);
    let lower = data.order_statistic(h.floor() as usize + 1);
    let upper = data.order_statistic(h.ceil() as usize + 1);
    lower + (h - h.floor()) * (upper - lower)
}

impl ClaimScorer for ThresholdScorer {
    fn kind(&self) -> MethodKind {
        MethodKind::Threshold
    }

    fn score(&self, table: &ClaimTable) -> Vec<Option<Detection>> {
        if table.is_empty() {
            return Vec::new();
        }

        let cutoff = self.cutoff_for(table);
        log::debug!("Threshold cutoff resolved to {:.2}", cutoff);

        table
            .iter()
            .map(|claim| {
                let amount = claim.claim_amount;
                // A zero cutoff can only come from a percentile over mostly-zero amounts
                let score = if cutoff > 0.0 {
                    (amount / cutoff).min(1.0)
                } else if amount > 0.0 {
                    1.0
                } else {
                    0.0
                };
                Some(Detection::new(score, amount > cutoff))
            })
            .collect()
    }
}

/// Flags claims more than `threshold` population standard deviations from
/// the mean amount
#[derive(Debug, Clone)]
pub struct ZScoreScorer {
    threshold: f64,
}

impl ZScoreScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for ZScoreScorer {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl ClaimScorer for ZScoreScorer {
    fn kind(&self) -> MethodKind {
        MethodKind::ZScore
    }

    fn score(&self, table: &ClaimTable) -> Vec<Option<Detection>> {
        let amounts = table.amounts();
        if amounts.is_empty() {
            return Vec::new();
        }

        let min = amounts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = amounts.iter().mean();
        let std_dev = amounts.iter().population_std_dev();

        // Identical amounts can still leave rounding noise in the variance
        if min == max || std_dev == 0.0 || !std_dev.is_finite() {
            log::debug!("Zero variance in claim amounts, z-scores are all 0");
            return vec![Some(Detection::new(0.0, false)); amounts.len()];
        }

        amounts
            .iter()
            .map(|&amount| {
                let z = ((amount - mean) / std_dev).abs();
                Some(Detection::new((z / self.threshold).min(1.0), z > self.threshold))
            })
            .collect()
    }
}

/// Which side of a claim the frequency method counts by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Patient,
    #[default]
    Provider,
}

/// Flags claims of patients or providers that bill more than `max_claims`
/// times inside a sliding window of `window_days` days.
///
/// Undated claims are not scored.
#[derive(Debug, Clone)]
pub struct FrequencyScorer {
    max_claims: f64,
    window_days: i64,
    entity: Entity,
}

impl FrequencyScorer {
    pub fn new(max_claims: f64, window_days: i64, entity: Entity) -> Self {
        Self {
            max_claims,
            window_days,
            entity,
        }
    }
}

impl ClaimScorer for FrequencyScorer {
    fn kind(&self) -> MethodKind {
        MethodKind::Frequency
    }

    fn score(&self, table: &ClaimTable) -> Vec<Option<Detection>> {
        let mut by_entity: HashMap<i64, Vec<(NaiveDate, usize)>> = HashMap::new();
        for (row, claim) in table.iter().enumerate() {
            if let Some(date) = claim.claim_date {
                let key = match self.entity {
                    Entity::Patient => claim.patient_id,
                    Entity::Provider => claim.provider_id,
                };
                by_entity.entry(key).or_default().push((date, row));
            }
        }

        let mut results = vec![None; table.len()];
        for claims in by_entity.values_mut() {
            claims.sort_unstable();
            let dates: Vec<NaiveDate> = claims.iter().map(|&(date, _)| date).collect();
            let counts = peak_window_counts(&dates, self.window_days);

            for (&(_, row), &count) in claims.iter().zip(&counts) {
                let count = count as f64;
                results[row] = Some(Detection::new(
                    (count / self.max_claims).min(1.0),
                    count > self.max_claims,
                ));
            }
        }

        let scored = results.iter().filter(|r| r.is_some()).count();
        log::debug!(
            "Frequency method scored {} of {} claims across {} entities",
            scored,
            table.len(),
            by_entity.len()
        );

        results
    }
}

/// For each position in `dates` (sorted ascending), the largest number of
/// claims in any `[start, start + window_days)` window that covers it.
pub(crate) fn peak_window_counts(dates: &[NaiveDate], window_days: i64) -> Vec<usize> {
    let mut days: Vec<(NaiveDate, usize)> = Vec::new();
    for &date in dates {
        match days.last_mut() {
            Some((last, n)) if *last == date => *n += 1,
            _ => days.push((date, 1)),
        }
    }

    let span = |from: usize, to: usize| (days[to].0 - days[from].0).num_days();

    // Claims in the window starting on each distinct day
    let mut totals = vec![0usize; days.len()];
    let mut end = 0;
    let mut running = 0;
    for start in 0..days.len() {
        while end < days.len() && span(start, end) < window_days {
            running += days[end].1;
            end += 1;
        }
        totals[start] = running;
        running -= days[start].1;
    }

    // Sliding maximum over the window starts that still cover each day
    let mut peaks = Vec::with_capacity(days.len());
    let mut candidates: VecDeque<usize> = VecDeque::new();
    let mut oldest = 0;
    for day in 0..days.len() {
        while candidates.back().map_or(false, |&c| totals[c] <= totals[day]) {
            candidates.pop_back();
        }
        candidates.push_back(day);

        while span(oldest, day) >= window_days {
            oldest += 1;
        }
        while candidates.front().map_or(false, |&c| c < oldest) {
            candidates.pop_front();
        }
        peaks.push(candidates.front().map_or(0, |&c| totals[c]));
    }

    days.iter()
        .zip(peaks)
        .flat_map(|(&(_, n), peak)| std::iter::repeat(peak).take(n))
        .collect()
}
