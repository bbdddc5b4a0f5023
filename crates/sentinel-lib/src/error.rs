//! Error taxonomy for the evaluation and reconciliation engine

use std::time::Duration;

use crate::models::NotificationStatus;

/// Failures raised by a notification store or its transactions
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction already finished")]
    TransactionClosed,
}

/// Errors surfaced by the sentinel library
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// A candidate lacks an identity field needed to compute its dedupe key
    #[error("invalid candidate: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The requested transition is not allowed from the current status
    #[error("notification {id} is {status}, expected OPEN")]
    Conflict { id: i64, status: NotificationStatus },

    #[error("notification {0} not found")]
    NotFound(i64),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("sampler for {provider} failed: {message}")]
    Sampler { provider: String, message: String },
}

impl SentinelError {
    /// Whether the failure should simply be retried on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SentinelError::Store(_) | SentinelError::Timeout { .. } | SentinelError::Sampler { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
