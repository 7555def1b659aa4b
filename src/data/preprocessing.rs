//! Claim table cleaning and filtering

use std::collections::HashSet;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::{ClaimRecord, ClaimTable, RawClaim};

/// Drop unusable rows and build a table from what remains.
///
/// Removes exact duplicates, rows missing a required field, and rows whose
/// amount is negative or not finite. Surviving rows keep their relative order.
pub fn sanitize(raw_claims: Vec<RawClaim>) -> ClaimTable {
    let input_rows = raw_claims.len();

    let records: Vec<ClaimRecord> = raw_claims
        .into_iter()
        .enumerate()
        .filter_map(|(row, raw)| raw.into_record(row).ok())
        .unique_by(|r| {
            (
                r.patient_id,
                r.provider_id,
                r.claim_amount.to_bits(),
                r.diagnosis_code.clone(),
                r.procedure_code.clone(),
                r.claim_date,
            )
        })
        .collect();

    log::info!(
        "Sanitized claims: kept {} of {} rows",
        records.len(),
        input_rows
    );

    // Every surviving record passed validation in into_record
    ClaimTable { records }
}

/// Caller-selected subset of a claim table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimFilter {
    #[serde(default)]
    pub patient_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub provider_ids: Option<Vec<i64>>,
    /// Inclusive date range. Undated claims never match a range.
    #[serde(default)]
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub max_amount: Option<f64>,
}

impl ClaimFilter {
    pub fn is_empty(&self) -> bool {
        self.patient_ids.as_ref().map_or(true, |ids| ids.is_empty())
            && self.provider_ids.as_ref().map_or(true, |ids| ids.is_empty())
            && self.date_range.is_none()
            && self.min_amount.is_none()
            && self.max_amount.is_none()
    }
}

/// Filter a table; the result is a new table with its own row indices
pub fn filter_claims(table: &ClaimTable, filter: &ClaimFilter) -> ClaimTable {
    // An empty id list means "no restriction"
    let to_set = |ids: &Option<Vec<i64>>| -> Option<HashSet<i64>> {
        ids.as_ref()
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().copied().collect())
    };
    let patients = to_set(&filter.patient_ids);
    let providers = to_set(&filter.provider_ids);

    let records: Vec<ClaimRecord> = table
        .iter()
        .filter(|r| patients.as_ref().map_or(true, |set| set.contains(&r.patient_id)))
        .filter(|r| providers.as_ref().map_or(true, |set| set.contains(&r.provider_id)))
        .filter(|r| match (filter.date_range, r.claim_date) {
            (None, _) => true,
            (Some((start, end)), Some(date)) => date >= start && date <= end,
            (Some(_), None) => false,
        })
        .filter(|r| filter.min_amount.map_or(true, |min| r.claim_amount >= min))
        .filter(|r| filter.max_amount.map_or(true, |max| r.claim_amount <= max))
        .cloned()
        .collect();

    log::debug!("Filter kept {} of {} claims", records.len(), table.len());

    ClaimTable { records }
}
