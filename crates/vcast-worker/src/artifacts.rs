//! Per-job scratch space.
//!
//! Every intermediate file a job creates is registered here before it is
//! written. `cleanup` removes them and the scratch directory; dropping an
//! uncleaned tracker does the same synchronously.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vcast_models::JobId;

/// Files left behind after cleanup, if any.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub struct ArtifactTracker {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cleaned: bool,
}

impl ArtifactTracker {
    /// Create `work_dir/<job_id>-<attempt>` and track it.
    ///
    /// Each claim gets its own directory, so a reclaimed job never shares
    /// scratch files with the worker that lost it.
    pub async fn create(work_dir: &Path, job_id: &JobId, attempt: u32) -> std::io::Result<Self> {
        let dir = work_dir.join(scratch_dir_name(job_id, attempt));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            files: Vec::new(),
            cleaned: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register `name` inside the scratch directory and return its path.
    pub fn path(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        self.track(path.clone());
        path
    }

    /// Register a file that will be created.
    pub fn track(&mut self, path: PathBuf) {
        self.files.push(path);
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove every tracked file and the scratch directory.
    pub async fn cleanup(mut self) -> CleanupReport {
        self.cleaned = true;
        let mut report = CleanupReport::default();

        for file in std::mem::take(&mut self.files) {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", file.display(), e);
                    report.failed.push(file);
                }
            }
        }

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove scratch dir {}: {}", self.dir.display(), e);
                report.failed.push(self.dir.clone());
            }
        }

        debug!("Removed {} scratch files from {}", report.removed, self.dir.display());
        report
    }
}

pub fn scratch_dir_name(job_id: &JobId, attempt: u32) -> String {
    format!("{}-{}", job_id, attempt)
}

impl Drop for ArtifactTracker {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        warn!(
            "Scratch dir {} dropped without cleanup; removing synchronously",
            self.dir.display()
        );
        for file in &self.files {
            let _ = std::fs::remove_file(file);
        }
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
