//! Error types for the analytics engines

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised by the analytics engines and their data plumbing
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A staged engine step was called before the step it depends on
    #[error("cannot run {operation}: run {requires} first")]
    Precondition {
        operation: &'static str,
        requires: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("clustering failed: {0}")]
    Clustering(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalyticsError {
    pub(crate) fn precondition(operation: &'static str, requires: &'static str) -> Self {
        Self::Precondition {
            operation,
            requires,
        }
    }

    /// True when the error reports a call-order violation
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}

/// Result type used by the engines
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;
