//! Claim records, claim tables and table-level statistics

pub mod loader;
pub mod preprocessing;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::error::{EngineError, EngineResult};

/// One healthcare billing record linking a patient and a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub patient_id: i64,
    pub provider_id: i64,
    pub claim_amount: f64,
    pub diagnosis_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_date: Option<NaiveDate>,
}

impl ClaimRecord {
    pub fn new(patient_id: i64, provider_id: i64, claim_amount: f64, diagnosis_code: &str) -> Self {
        Self {
            patient_id,
            provider_id,
            claim_amount,
            diagnosis_code: diagnosis_code.to_string(),
            procedure_code: None,
            claim_date: None,
        }
    }

    pub fn with_procedure(mut self, procedure_code: &str) -> Self {
        self.procedure_code = Some(procedure_code.to_string());
        self
    }

    pub fn with_date(mut self, claim_date: NaiveDate) -> Self {
        self.claim_date = Some(claim_date);
        self
    }

    /// Check the record's field constraints, reporting `row` on failure
    pub fn validate(&self, row: usize) -> EngineResult<()> {
        if !self.claim_amount.is_finite() {
            return Err(EngineError::InvalidAmount { row });
        }
        if self.claim_amount < 0.0 {
            return Err(EngineError::NegativeAmount {
                row,
                amount: self.claim_amount,
            });
        }
        if self.diagnosis_code.trim().is_empty() {
            return Err(EngineError::MissingField {
                row,
                field: "diagnosis_code",
            });
        }
        Ok(())
    }
}

/// A claim record as read from an external source, before validation.
///
/// Every field may be absent; [`RawClaim::into_record`] decides which of
/// those gaps are fatal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawClaim {
    pub patient_id: Option<i64>,
    pub provider_id: Option<i64>,
    pub claim_amount: Option<f64>,
    pub diagnosis_code: Option<String>,
    pub procedure_code: Option<String>,
    pub claim_date: Option<NaiveDate>,
}

impl RawClaim {
    /// Convert into a validated record
    pub fn into_record(self, row: usize) -> EngineResult<ClaimRecord> {
        let missing = |field| EngineError::MissingField { row, field };

        let record = ClaimRecord {
            patient_id: self.patient_id.ok_or_else(|| missing("patient_id"))?,
            provider_id: self.provider_id.ok_or_else(|| missing("provider_id"))?,
            claim_amount: self.claim_amount.ok_or_else(|| missing("claim_amount"))?,
            diagnosis_code: self.diagnosis_code.ok_or_else(|| missing("diagnosis_code"))?,
            procedure_code: self.procedure_code.filter(|code| !code.trim().is_empty()),
            claim_date: self.claim_date,
        };
        record.validate(row)?;

        Ok(record)
    }
}

/// Ordered, validated sequence of claim records.
///
/// Row indices are positions in this table and are what every result refers
/// back to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ClaimRecord>", into = "Vec<ClaimRecord>")]
pub struct ClaimTable {
    records: Vec<ClaimRecord>,
}

impl ClaimTable {
    /// Build a table, rejecting the first invalid record
    pub fn new(records: Vec<ClaimRecord>) -> EngineResult<Self> {
        for (row, record) in records.iter().enumerate() {
            record.validate(row)?;
        }
        Ok(Self { records })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ClaimRecord] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&ClaimRecord> {
        self.records.get(row)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClaimRecord> {
        self.records.iter()
    }

    /// Claim amounts in row order
    pub fn amounts(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.claim_amount).collect()
    }

    /// Summary statistics over the table; `None` when the table is empty
    pub fn statistics(&self) -> Option<ClaimStatistics> {
        if self.records.is_empty() {
            return None;
        }

        let amounts = self.amounts();
        let total_amount: f64 = amounts.iter().sum();
        let min_claim = amounts.iter().copied().fold(f64::INFINITY, f64::min);
        let max_claim = amounts.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        // Sample standard deviation is undefined for a single claim
        let std_dev = if amounts.len() > 1 {
            amounts.iter().std_dev()
        } else {
            0.0
        };
        let avg_claim = amounts.iter().mean();
        let median_claim = Data::new(amounts).quantile(0.5);

        let unique_patients = self.records.iter().map(|r| r.patient_id).unique().count();
        let unique_providers = self.records.iter().map(|r| r.provider_id).unique().count();

        Some(ClaimStatistics {
            total_claims: self.records.len(),
            total_amount,
            avg_claim,
            median_claim,
            min_claim,
            max_claim,
            std_dev,
            unique_patients,
            unique_providers,
        })
    }
}

impl TryFrom<Vec<ClaimRecord>> for ClaimTable {
    type Error = EngineError;

    fn try_from(records: Vec<ClaimRecord>) -> EngineResult<Self> {
        Self::new(records)
    }
}

impl From<ClaimTable> for Vec<ClaimRecord> {
    fn from(table: ClaimTable) -> Self {
        table.records
    }
}

impl<'a> IntoIterator for &'a ClaimTable {
    type Item = &'a ClaimRecord;
    type IntoIter = std::slice::Iter<'a, ClaimRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Descriptive statistics of a claim table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimStatistics {
    pub total_claims: usize,
    pub total_amount: f64,
    pub avg_claim: f64,
    pub median_claim: f64,
    pub min_claim: f64,
    pub max_claim: f64,
    pub std_dev: f64,
    pub unique_patients: usize,
    pub unique_providers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<ClaimRecord> {
        vec![
            ClaimRecord::new(101, 501, 1000.0, "I10"),
            ClaimRecord::new(102, 502, 2500.0, "E11"),
            ClaimRecord::new(103, 501, 1500.0, "J45"),
            ClaimRecord::new(104, 503, 5000.0, "I50"),
            ClaimRecord::new(105, 502, 2000.0, "F41"),
        ]
    }

    #[test]
    fn test_table_rejects_negative_amount() {
        let mut records = sample_records();
        records[3].claim_amount = -10.0;

        let err = ClaimTable::new(records).unwrap_err();
        assert_eq!(err, EngineError::NegativeAmount { row: 3, amount: -10.0 });
    }

    #[test]
    fn test_table_rejects_blank_diagnosis() {
        let mut records = sample_records();
        records[1].diagnosis_code = "  ".to_string();

        let err = ClaimTable::new(records).unwrap_err();
        assert_eq!(err, EngineError::MissingField { row: 1, field: "diagnosis_code" });
    }

    #[test]
    fn test_table_rejects_nan_amount() {
        let mut records = sample_records();
        records[0].claim_amount = f64::NAN;

        assert_eq!(
            ClaimTable::new(records).unwrap_err(),
            EngineError::InvalidAmount { row: 0 }
        );
    }

    #[test]
    fn test_zero_amount_is_valid() {
        let table = ClaimTable::new(vec![ClaimRecord::new(1, 2, 0.0, "Z00")]).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_raw_claim_reports_missing_field() {
        let raw = RawClaim {
            patient_id: Some(1),
            provider_id: None,
            claim_amount: Some(10.0),
            diagnosis_code: Some("I10".to_string()),
            ..Default::default()
        };

        assert_eq!(
            raw.into_record(7).unwrap_err(),
            EngineError::MissingField { row: 7, field: "provider_id" }
        );
    }

    #[test]
    fn test_statistics_values() {
        let table = ClaimTable::new(sample_records()).unwrap();
        let stats = table.statistics().unwrap();

        assert_eq!(stats.total_claims, 5);
        assert_eq!(stats.total_amount, 12000.0);
        assert_eq!(stats.avg_claim, 2400.0);
        assert_eq!(stats.median_claim, 2000.0);
        assert_eq!(stats.min_claim, 1000.0);
        assert_eq!(stats.max_claim, 5000.0);
        assert_eq!(stats.unique_patients, 5);
        assert_eq!(stats.unique_providers, 3);
        assert!(stats.std_dev > 0.0);
    }

    #[test]
    fn test_statistics_empty_table() {
        assert!(ClaimTable::empty().statistics().is_none());
    }

    #[test]
    fn test_statistics_single_row() {
        let table = ClaimTable::new(vec![ClaimRecord::new(1, 2, 42.0, "I10")]).unwrap();
        let stats = table.statistics().unwrap();
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.median_claim, 42.0);
    }

    #[test]
    fn test_procedure_code_round_trips() {
        let table = ClaimTable::new(vec![
            ClaimRecord::new(1, 2, 5.0, "I10").with_procedure("99213"),
            ClaimRecord::new(1, 2, 5.0, "I10"),
        ])
        .unwrap();

        let json = serde_json::to_string(&table).unwrap();
        let back: ClaimTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(0).unwrap().procedure_code.as_deref(), Some("99213"));
        assert_eq!(back.get(1).unwrap().procedure_code, None);
        assert_eq!(back, table);
    }

    #[test]
    fn test_table_deserialize_validates() {
        let json = r#"[{"patient_id":1,"provider_id":2,"claim_amount":-5.0,"diagnosis_code":"I10"}]"#;
        assert!(serde_json::from_str::<ClaimTable>(json).is_err());

        let json = r#"[{"patient_id":1,"provider_id":2,"claim_amount":5.0,"diagnosis_code":"I10","claim_date":"2023-01-02"}]"#;
        let table: ClaimTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.get(0).unwrap().claim_date, NaiveDate::from_ymd_opt(2023, 1, 2));
    }
}
