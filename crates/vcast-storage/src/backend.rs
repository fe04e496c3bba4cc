//! Durable artifact storage abstraction.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vcast_models::{ExportKind, JobId};

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};
use crate::local::LocalStorage;

/// Where a finished artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Storage key, relative to the backend root
    pub key: String,
    /// URL handed back to clients
    pub url: String,
    /// Size in bytes
    pub size: u64,
}

/// Durable home for export outputs, and the `r2://` input namespace.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Move or upload the file at `src` under `key`. `src` may be consumed.
    async fn store(&self, src: &Path, key: &str, content_type: &str) -> StorageResult<StoredArtifact>;

    /// Copy the object at `key` to `dest`, returning its size.
    async fn fetch(&self, key: &str, dest: &Path) -> StorageResult<u64>;

    /// Readiness check.
    async fn check(&self) -> StorageResult<()>;

    fn backend(&self) -> StorageBackend;
}

/// Storage backend selector (`STORAGE_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Local,
    R2,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Local => "local",
            StorageBackend::R2 => "r2",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "fs" => Ok(StorageBackend::Local),
            "r2" | "s3" => Ok(StorageBackend::R2),
            other => Err(StorageError::config_error(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

/// Storage key for a job's output: `exports/{user}/{job}.{ext}`.
pub fn artifact_key(user_id: &str, job_id: &JobId, kind: ExportKind) -> String {
    format!(
        "exports/{}/{}.{}",
        sanitize_segment(user_id),
        job_id,
        kind.extension()
    )
}

/// Storage key for an uploaded input: `uploads/{user}/{upload}.{ext}`.
pub fn upload_key(user_id: &str, upload_id: &str, extension: &str) -> String {
    format!(
        "uploads/{}/{}.{}",
        sanitize_segment(user_id),
        sanitize_segment(upload_id),
        sanitize_segment(extension)
    )
}

fn sanitize_segment(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "anonymous".to_string()
    } else {
        cleaned
    }
}

/// Reject keys that could escape the storage root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Build the backend named by `STORAGE_BACKEND` (default `local`).
pub async fn storage_from_env() -> StorageResult<Arc<dyn ArtifactStorage>> {
    let backend = match std::env::var("STORAGE_BACKEND") {
        Ok(value) => value.parse()?,
        Err(_) => StorageBackend::default(),
    };

    let storage: Arc<dyn ArtifactStorage> = match backend {
        StorageBackend::Local => Arc::new(LocalStorage::from_env()),
        StorageBackend::R2 => Arc::new(R2Client::from_env().await?),
    };
    Ok(storage)
}
