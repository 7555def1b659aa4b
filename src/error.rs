//! Error types for the fraud signal engine

use thiserror::Error;

/// Errors raised by the scoring and network analysis entry points.
///
/// Input problems are reported before any computation starts. Degenerate data
/// (empty tables, zero variance, tiny graphs) is never an error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Missing required field '{field}' at row {row}")]
    MissingField { row: usize, field: &'static str },

    #[error("Negative claim amount {amount} at row {row}")]
    NegativeAmount { row: usize, amount: f64 },

    #[error("Claim amount at row {row} is not a finite number")]
    InvalidAmount { row: usize },

    #[error("Unknown anomaly method: {0}")]
    UnknownMethod(String),

    #[error("Anomaly method '{0}' configured more than once")]
    DuplicateMethod(String),

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Failed to load claims: {0}")]
    Load(String),
}

impl EngineError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
