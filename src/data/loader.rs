//! CSV and Parquet claim file loading

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;

use crate::data::preprocessing::sanitize;
use crate::data::{ClaimRecord, ClaimTable, RawClaim};
use crate::error::EngineError;

const REQUIRED_COLUMNS: [&str; 4] = ["patient_id", "provider_id", "claim_amount", "diagnosis_code"];

/// Column names accepted for the claim date, in order of preference
const DATE_COLUMNS: [&str; 2] = ["claim_date", "date"];

/// Load a claim table from a local CSV or Parquet file.
///
/// With `sanitize_rows` unusable rows are dropped; otherwise the first bad
/// row aborts the load with an error naming the row and field.
pub fn load_claims(path: &str, sanitize_rows: bool) -> Result<ClaimTable> {
    log::info!("Reading claims file: {}", path);

    if !Path::new(path).exists() {
        return Err(anyhow::anyhow!("File not found: {}", path));
    }

    let df = read_frame(Path::new(path)).with_context(|| format!("reading {}", path))?;
    log::info!("Loaded {} rows with columns {:?}", df.height(), df.get_column_names());

    let raw_claims = frame_to_raw_claims(&df)?;

    if sanitize_rows {
        return Ok(sanitize(raw_claims));
    }

    let records = raw_claims
        .into_iter()
        .enumerate()
        .map(|(row, raw)| raw.into_record(row))
        .collect::<Result<Vec<ClaimRecord>, EngineError>>()?;

    Ok(ClaimTable::new(records)?)
}

fn read_frame(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let df = match extension.as_deref() {
        Some("parquet") => LazyFrame::scan_parquet(path, Default::default())?.collect()?,
        _ => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
    };

    Ok(df)
}

/// Convert a data frame into raw claims without judging the values
pub fn frame_to_raw_claims(df: &DataFrame) -> Result<Vec<RawClaim>> {
    for name in REQUIRED_COLUMNS {
        if df.column(name).is_err() {
            return Err(EngineError::Load(format!("missing required column '{}'", name)).into());
        }
    }

    let patient_ids = int_column(df, "patient_id")?;
    let provider_ids = int_column(df, "provider_id")?;
    let amounts = df.column("claim_amount")?.cast(&DataType::Float64)?.f64()?.clone();
    let diagnoses = string_column(df, "diagnosis_code")?;

    let procedures = match df.column("procedure_code") {
        Ok(_) => Some(string_column(df, "procedure_code")?),
        Err(_) => None,
    };
    let dates = match DATE_COLUMNS.iter().find(|name| df.column(name).is_ok()) {
        Some(name) => Some(string_column(df, name)?),
        None => None,
    };

    let raw_claims = (0..df.height())
        .map(|i| RawClaim {
            patient_id: patient_ids.get(i),
            provider_id: provider_ids.get(i),
            claim_amount: amounts.get(i),
            diagnosis_code: diagnoses.get(i).map(str::to_string),
            procedure_code: procedures
                .as_ref()
                .and_then(|col| col.get(i))
                .map(str::to_string),
            claim_date: dates.as_ref().and_then(|col| col.get(i)).and_then(parse_date),
        })
        .collect();

    Ok(raw_claims)
}

fn int_column(df: &DataFrame, name: &str) -> PolarsResult<Int64Chunked> {
    Ok(df.column(name)?.cast(&DataType::Int64)?.i64()?.clone())
}

fn string_column(df: &DataFrame, name: &str) -> PolarsResult<StringChunked> {
    Ok(df.column(name)?.cast(&DataType::String)?.str()?.clone())
}

/// Parse the leading `YYYY-MM-DD` of a date or timestamp string
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok()
}
