use common::{Retryable, is_retryable_message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stored row is malformed: {0}")]
    Data(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl Retryable for StoreError {
    /// Transient database conditions (locked, busy, timed out) are worth
    /// another attempt; malformed rows and bad snapshots never are.
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(msg) => is_retryable_message(msg),
            StoreError::Serde(_) | StoreError::Data(_) => false,
        }
    }
}
