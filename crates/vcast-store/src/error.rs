//! Job store error types.

use thiserror::Error;
use vcast_models::ValidationError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid export request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt job row {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),
}

impl StoreError {
    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn connection_unavailable(msg: impl Into<String>) -> Self {
        Self::ConnectionUnavailable(msg.into())
    }

    /// Whether the caller rejected the request (as opposed to an infrastructure failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::InvalidRequest(_))
    }

    /// Lock contention that outlived the busy timeout.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}
