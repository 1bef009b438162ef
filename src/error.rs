use serde::Serialize;
use thiserror::Error;

use crate::{quota::QuotaError, store::StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller supplied invalid query parameters; the query was not attempted.
    #[error("validation error: {0}")]
    Validation(String),

    /// Event store scan failed or timed out.
    #[error("data source error: {0}")]
    DataSource(#[from] StoreError),

    /// Quota tracker read or update failed.
    #[error("quota error: {0}")]
    Quota(#[from] QuotaError),

    /// The caller's context was cancelled mid-query; partial results were
    /// discarded.
    #[error("query cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the caller may retry the same query.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::DataSource(StoreError::Timeout)
                | EngineError::Quota(QuotaError::Timeout)
                | EngineError::Cancelled
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Machine-readable degradation marker carried on an analytics response.
///
/// The engine never propagates an aggregation or quota failure as a fatal
/// error to the presentation layer; it returns a well-formed response with
/// the affected parts zeroed or nulled plus one of these codes, and the UI
/// decides how to communicate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DataSourceUnavailable,
    QuotaUnavailable,
}
