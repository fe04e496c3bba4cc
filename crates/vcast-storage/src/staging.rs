//! Input staging: bring a job's audio reference into its scratch directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::backend::ArtifactStorage;
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::copy_atomic;

/// Default timeout for fetching a remote input.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on a staged input.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 500 * 1024 * 1024;

/// Where a job's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// `http://` or `https://`
    Http(Url),
    /// `r2://key`, resolved through the configured storage backend
    Stored(String),
    /// `file://` URL or plain path
    Path(PathBuf),
}

impl InputSource {
    /// Classify an audio reference.
    pub fn parse(reference: &str) -> StorageResult<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(StorageError::UnsupportedSource("empty audio reference".to_string()));
        }

        if let Some(key) = reference.strip_prefix("r2://") {
            return Ok(InputSource::Stored(key.trim_start_matches('/').to_string()));
        }

        match Url::parse(reference) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(InputSource::Http(url)),
                "file" => url
                    .to_file_path()
                    .map(InputSource::Path)
                    .map_err(|_| StorageError::UnsupportedSource(reference.to_string())),
                // Windows drive letters parse as a one-letter scheme.
                scheme if scheme.len() == 1 => Ok(InputSource::Path(PathBuf::from(reference))),
                other => Err(StorageError::UnsupportedSource(format!(
                    "scheme '{}' in {}",
                    other, reference
                ))),
            },
            Err(_) => Ok(InputSource::Path(PathBuf::from(reference))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InputSource::Http(_) => "http",
            InputSource::Stored(_) => "r2",
            InputSource::Path(_) => "path",
        }
    }

    /// File extension suggested by the reference, if any.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            InputSource::Http(url) => url.path_segments()?.last()?.to_string(),
            InputSource::Stored(key) => key.rsplit('/').next()?.to_string(),
            InputSource::Path(path) => path.file_name()?.to_string_lossy().to_string(),
        };
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .then_some(ext)
    }
}

/// Fetches job inputs into scratch space.
///
/// Host paths and `file://` references are refused unless explicitly
/// allowed, and every source is capped at `max_bytes`.
#[derive(Clone)]
pub struct InputStager {
    http: reqwest::Client,
    allow_local_paths: bool,
    max_bytes: u64,
}

impl InputStager {
    pub fn new(timeout: Duration) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            allow_local_paths: false,
            max_bytes: DEFAULT_MAX_INPUT_BYTES,
        })
    }

    /// Accept host paths and `file://` references.
    pub fn with_local_paths(mut self, allow: bool) -> Self {
        self.allow_local_paths = allow;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Stage `reference` at `dest`, returning the byte count.
    pub async fn stage(
        &self,
        reference: &str,
        dest: &Path,
        storage: &dyn ArtifactStorage,
    ) -> StorageResult<u64> {
        let source = InputSource::parse(reference)?;
        debug!("Staging {} input to {}", source.kind(), dest.display());

        let size = match &source {
            InputSource::Http(url) => self.download(url, dest).await?,
            InputSource::Stored(key) => storage.fetch(key, dest).await?,
            InputSource::Path(path) => {
                if !self.allow_local_paths {
                    return Err(StorageError::UnsupportedSource(
                        "local paths are disabled on this worker".to_string(),
                    ));
                }
                let metadata = tokio::fs::metadata(path)
                    .await
                    .map_err(|_| StorageError::not_found(path.display().to_string()))?;
                if metadata.len() > self.max_bytes {
                    return Err(StorageError::InputTooLarge { limit: self.max_bytes });
                }
                copy_atomic(path, dest).await?
            }
        };

        if size > self.max_bytes {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(StorageError::InputTooLarge { limit: self.max_bytes });
        }
        if size == 0 {
            return Err(StorageError::download_failed(format!(
                "input {} is empty",
                reference
            )));
        }

        info!("Staged {} bytes from {} source", size, source.kind());
        Ok(size)
    }

    async fn download(&self, url: &Url, dest: &Path) -> StorageResult<u64> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::not_found(url.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::download_failed(format!(
                "HTTP {} fetching {}",
                status, url
            )));
        }

        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(StorageError::InputTooLarge { limit: self.max_bytes });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(StorageError::InputTooLarge { limit: self.max_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}
