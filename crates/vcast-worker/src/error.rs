//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Pipeline failures carry the stage they happened in; the `Display` text is
/// what ends up in the job's error message.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to fetch input audio: {0}")]
    StagingFailed(String),

    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Failed to store output: {0}")]
    OutputFailed(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Lease lost: {0}")]
    LeaseLost(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] vcast_store::StoreError),

    #[error("Media error: {0}")]
    Media(#[from] vcast_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vcast_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn staging_failed(msg: impl std::fmt::Display) -> Self {
        Self::StagingFailed(msg.to_string())
    }

    pub fn render_failed(msg: impl std::fmt::Display) -> Self {
        Self::RenderFailed(msg.to_string())
    }

    pub fn encoding_failed(msg: impl std::fmt::Display) -> Self {
        Self::EncodingFailed(msg.to_string())
    }

    pub fn output_failed(msg: impl std::fmt::Display) -> Self {
        Self::OutputFailed(msg.to_string())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn lease_lost(msg: impl Into<String>) -> Self {
        Self::LeaseLost(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// The job store itself is unavailable; the poll loop should back off.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, WorkerError::Store(_))
    }

    /// Another worker owns the job now; its status must not be written.
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, WorkerError::LeaseLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcast_media::{MediaError, RenderError};

    #[test]
    fn test_render_failure_names_frame() {
        let err = WorkerError::render_failed(MediaError::Render(RenderError::frame(7, "boom")));
        assert_eq!(err.to_string(), "Rendering failed: Failed to render frame 7: boom");
    }

    #[test]
    fn test_infrastructure() {
        let store = WorkerError::Store(vcast_store::StoreError::connection_unavailable("locked"));
        assert!(store.is_infrastructure());
        assert!(!WorkerError::staging_failed("404").is_infrastructure());
    }
}
