//! Local public-directory storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::backend::{validate_key, ArtifactStorage, StorageBackend, StoredArtifact};
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{copy_atomic, move_file};

/// Local storage configuration.
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    /// Public root directory (`OUTPUT_DIR`)
    pub output_dir: PathBuf,
    /// URL prefix the root is served under (`PUBLIC_BASE_URL`)
    pub public_base_url: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public"),
            public_base_url: "/files".to_string(),
        }
    }
}

impl LocalStorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or(defaults.public_base_url),
        }
    }
}

/// Artifacts live under a directory served by a web server at
/// `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: LocalStorageConfig) -> Self {
        Self::new(config.output_dir, config.public_base_url)
    }

    pub fn from_env() -> Self {
        Self::from_config(LocalStorageConfig::from_env())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn store(&self, src: &Path, key: &str, _content_type: &str) -> StorageResult<StoredArtifact> {
        let dst = self.path_for(key)?;
        move_file(src, &dst).await?;
        let size = tokio::fs::metadata(&dst).await?.len();

        info!("Stored {} ({} bytes)", dst.display(), size);
        Ok(StoredArtifact {
            key: key.to_string(),
            url: self.url_for(key),
            size,
        })
    }

    async fn fetch(&self, key: &str, dest: &Path) -> StorageResult<u64> {
        let src = self.path_for(key)?;
        if !tokio::fs::try_exists(&src).await.unwrap_or(false) {
            return Err(StorageError::not_found(key));
        }
        copy_atomic(&src, dest).await
    }

    async fn check(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(".write-check");
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
