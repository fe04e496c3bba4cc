//! Export job store backed by SQLite.
//!
//! One row per job in `export_jobs`. Every field that is compared or
//! updated conditionally has its own typed column; the manifest, style and
//! audio reference are opaque JSON payloads that are never filtered on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info, warn};
use vcast_models::{ExportJob, ExportKind, JobId, JobStatus, NewExportJob};

use crate::error::{StoreError, StoreResult};
use crate::metrics;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS export_jobs (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    kind          TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    progress      INTEGER NOT NULL DEFAULT 0,
    audio_ref     TEXT NOT NULL,
    manifest      TEXT NOT NULL,
    style         TEXT NOT NULL,
    output_url    TEXT,
    output_size   INTEGER,
    error_message TEXT,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL,
    completed_at  INTEGER,
    claimed_at    INTEGER,
    worker_id     TEXT,
    attempts      INTEGER NOT NULL DEFAULT 0,
    CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    CHECK (progress BETWEEN 0 AND 100)
);

CREATE INDEX IF NOT EXISTS idx_export_jobs_claim ON export_jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_export_jobs_user ON export_jobs(user_id, created_at DESC);
"#;

const JOB_COLUMNS: &str = "id, user_id, kind, status, progress, audio_ref, manifest, style, \
     output_url, output_size, error_message, created_at, updated_at, completed_at, \
     claimed_at, worker_id, attempts";

/// Default ceiling on program duration accepted at submission (3 minutes).
pub const DEFAULT_MAX_DURATION_MS: u64 = 180_000;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// How long a writer waits on a locked database
    pub busy_timeout: Duration,
    /// Longest program accepted by `submit`
    pub max_duration_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/vcast.db"),
            busy_timeout: Duration::from_secs(5),
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/vcast.db")),
            busy_timeout: Duration::from_millis(
                std::env::var("DATABASE_BUSY_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5000),
            ),
            max_duration_ms: std::env::var("MAX_EXPORT_DURATION_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_DURATION_MS),
        }
    }
}

/// Partial update applied together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub progress: Option<u8>,
    pub output_url: Option<String>,
    pub output_size: Option<u64>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn completed(output_url: impl Into<String>, output_size: u64) -> Self {
        Self {
            progress: Some(100),
            output_url: Some(output_url.into()),
            output_size: Some(output_size),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Outcome of a stale-claim sweep.
#[derive(Debug, Clone, Default)]
pub struct ReapReport {
    /// Jobs put back to `pending`
    pub requeued: Vec<JobId>,
    /// Jobs failed after exhausting their attempts
    pub failed: Vec<JobId>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

/// Durable export job store.
///
/// Cloning shares the underlying connection. Separate processes (or
/// separate `JobStore::open` calls) coordinate only through SQLite locking.
#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl JobStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::connection_unavailable(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(&config.database_path)?;
        conn.busy_timeout(config.busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        debug!(
            path = %config.database_path.display(),
            journal_mode = %mode,
            "Opened job store"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::open(StoreConfig::from_env())
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: StoreConfig {
                database_path: PathBuf::from(":memory:"),
                ..StoreConfig::default()
            },
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn database_path(&self) -> &Path {
        &self.config.database_path
    }

    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::connection_unavailable("connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::connection_unavailable(format!("store task failed: {}", e)))?;

        metrics::record_operation(
            operation,
            result.is_ok(),
            start.elapsed().as_secs_f64() * 1000.0,
        );
        result
    }

    /// Validate and insert a new `pending` job.
    ///
    /// Invalid requests return [`StoreError::InvalidRequest`] and leave no row behind.
    pub async fn submit(&self, request: NewExportJob) -> StoreResult<JobId> {
        request.validate(self.config.max_duration_ms)?;

        let id = JobId::new();
        let audio_ref = serde_json::to_string(&request.audio_ref)?;
        let manifest = serde_json::to_string(&request.manifest)?;
        let style = serde_json::to_string(&request.style)?;
        let kind = request.kind;
        let user_id = request.user_id.clone();
        let now = now_millis();

        let row_id = id.clone();
        self.with_conn("submit", move |conn| {
            conn.execute(
                "INSERT INTO export_jobs \
                 (id, user_id, kind, status, progress, audio_ref, manifest, style, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?5, ?6, ?7, ?7)",
                params![
                    row_id.as_str(),
                    user_id,
                    kind.as_str(),
                    audio_ref,
                    manifest,
                    style,
                    now
                ],
            )?;
            Ok(())
        })
        .await?;

        info!(
            job_id = %id,
            kind = %request.kind,
            user_id = %request.user_id,
            "Export job submitted"
        );
        Ok(id)
    }

    /// Atomically claim the oldest pending job for `worker_id`.
    ///
    /// `None` means nothing was claimable, including when another worker won
    /// the race for the same row.
    pub async fn claim_next(&self, worker_id: impl Into<String>) -> StoreResult<Option<ExportJob>> {
        let worker_id = worker_id.into();
        let now = now_millis();

        let row = self
            .with_conn("claim_next", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let sql = format!(
                    "UPDATE export_jobs \
                     SET status = 'processing', worker_id = ?1, claimed_at = ?2, updated_at = ?2, \
                         attempts = attempts + 1 \
                     WHERE id = (SELECT id FROM export_jobs WHERE status = 'pending' \
                                 ORDER BY created_at, rowid LIMIT 1) \
                       AND status = 'pending' \
                     RETURNING {}",
                    JOB_COLUMNS
                );
                let row = tx
                    .query_row(&sql, params![worker_id, now], JobRow::from_row)
                    .optional()?;
                tx.commit()?;
                Ok(row)
            })
            .await?;

        metrics::record_claim(row.is_some());
        row.map(JobRow::into_job).transpose()
    }

    /// Move a job owned by `worker_id` to `status`, applying the partial update.
    ///
    /// Only the worker holding the current claim can write. Terminal jobs
    /// never change to a different status; repeating the same terminal
    /// update is accepted. `completed_at` is set once, on the first terminal
    /// transition. Returns whether a row matched; `false` after a reclaim
    /// means the caller lost its lease.
    pub async fn update_status(
        &self,
        id: &JobId,
        worker_id: &str,
        status: JobStatus,
        update: StatusUpdate,
    ) -> StoreResult<bool> {
        let job_id = id.as_str().to_string();
        let worker_id = worker_id.to_string();
        let now = now_millis();
        let output_size = update.output_size.map(|s| s as i64);
        let progress = update.progress.map(|p| p.min(100) as i64);

        let changed = self
            .with_conn("update_status", move |conn| {
                let n = conn.execute(
                    "UPDATE export_jobs SET \
                         status = ?2, \
                         progress = COALESCE(?3, progress), \
                         output_url = COALESCE(?4, output_url), \
                         output_size = COALESCE(?5, output_size), \
                         error_message = COALESCE(?6, error_message), \
                         updated_at = ?7, \
                         completed_at = CASE WHEN ?2 IN ('completed', 'failed') \
                                             THEN COALESCE(completed_at, ?7) \
                                             ELSE completed_at END \
                     WHERE id = ?1 AND worker_id = ?8 \
                       AND (status NOT IN ('completed', 'failed') OR status = ?2)",
                    params![
                        job_id,
                        status.as_str(),
                        progress,
                        update.output_url,
                        output_size,
                        update.error,
                        now,
                        worker_id
                    ],
                )?;
                Ok(n > 0)
            })
            .await?;

        if !changed {
            warn!(job_id = %id, status = %status, "Status update ignored");
        }
        Ok(changed)
    }

    /// Record a progress milestone for a job `worker_id` is processing.
    ///
    /// Progress never moves backwards. Also refreshes `updated_at`, which the
    /// reaper reads as a heartbeat. Returns `false` once the claim is gone.
    pub async fn report_progress(
        &self,
        id: &JobId,
        worker_id: &str,
        progress: u8,
    ) -> StoreResult<bool> {
        let job_id = id.as_str().to_string();
        let worker_id = worker_id.to_string();
        let progress = progress.min(100) as i64;
        let now = now_millis();

        self.with_conn("report_progress", move |conn| {
            let n = conn.execute(
                "UPDATE export_jobs SET progress = MAX(progress, ?2), updated_at = ?3 \
                 WHERE id = ?1 AND worker_id = ?4 AND status = 'processing'",
                params![job_id, progress, now, worker_id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    pub async fn get(&self, id: &JobId) -> StoreResult<Option<ExportJob>> {
        let job_id = id.as_str().to_string();
        let row = self
            .with_conn("get", move |conn| {
                let sql = format!("SELECT {} FROM export_jobs WHERE id = ?1", JOB_COLUMNS);
                Ok(conn.query_row(&sql, [job_id], JobRow::from_row).optional()?)
            })
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    /// A submitter's jobs, newest first.
    pub async fn list_by_user(&self, user_id: &str, limit: u32) -> StoreResult<Vec<ExportJob>> {
        let user_id = user_id.to_string();
        let rows = self
            .with_conn("list_by_user", move |conn| {
                let sql = format!(
                    "SELECT {} FROM export_jobs WHERE user_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                    JOB_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![user_id, limit as i64], JobRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Number of jobs waiting to be claimed.
    pub async fn pending_count(&self) -> StoreResult<u64> {
        self.with_conn("pending_count", |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM export_jobs WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    /// Requeue or fail `processing` jobs whose heartbeat is older than `lease`.
    pub async fn reap_stale(&self, lease: Duration, max_attempts: u32) -> StoreResult<ReapReport> {
        let now = now_millis();
        let cutoff = now - lease.as_millis() as i64;
        let lease_secs = lease.as_secs();

        let report = self
            .with_conn("reap_stale", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let stale: Vec<(String, i64)> = {
                    let mut stmt = tx.prepare(
                        "SELECT id, attempts FROM export_jobs \
                         WHERE status = 'processing' AND updated_at <= ?1 \
                         ORDER BY created_at, rowid",
                    )?;
                    let rows = stmt
                        .query_map([cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                };

                let mut report = ReapReport::default();
                for (id, attempts) in stale {
                    if attempts < max_attempts as i64 {
                        tx.execute(
                            "UPDATE export_jobs SET status = 'pending', progress = 0, \
                                 worker_id = NULL, claimed_at = NULL, updated_at = ?2 \
                             WHERE id = ?1 AND status = 'processing'",
                            params![id, now],
                        )?;
                        report.requeued.push(JobId::from_string(id));
                    } else {
                        let message = format!(
                            "Worker lost: no heartbeat for {}s after {} attempts",
                            lease_secs, attempts
                        );
                        tx.execute(
                            "UPDATE export_jobs SET status = 'failed', error_message = ?2, \
                                 updated_at = ?3, completed_at = ?3 \
                             WHERE id = ?1 AND status = 'processing'",
                            params![id, message, now],
                        )?;
                        report.failed.push(JobId::from_string(id));
                    }
                }
                tx.commit()?;
                Ok(report)
            })
            .await?;

        if !report.is_empty() {
            metrics::record_reaped(report.requeued.len(), report.failed.len());
            info!(
                requeued = report.requeued.len(),
                failed = report.failed.len(),
                "Reaped stale export jobs"
            );
        }
        Ok(report)
    }

    /// Readiness probe.
    pub async fn ping(&self) -> StoreResult<()> {
        self.with_conn("ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Raw column values, decoded into an [`ExportJob`] outside the SQLite callback.
struct JobRow {
    id: String,
    user_id: String,
    kind: String,
    status: String,
    progress: i64,
    audio_ref: String,
    manifest: String,
    style: String,
    output_url: Option<String>,
    output_size: Option<i64>,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
    claimed_at: Option<i64>,
    worker_id: Option<String>,
    attempts: i64,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            status: row.get(3)?,
            progress: row.get(4)?,
            audio_ref: row.get(5)?,
            manifest: row.get(6)?,
            style: row.get(7)?,
            output_url: row.get(8)?,
            output_size: row.get(9)?,
            error_message: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            completed_at: row.get(13)?,
            claimed_at: row.get(14)?,
            worker_id: row.get(15)?,
            attempts: row.get(16)?,
        })
    }

    fn into_job(self) -> StoreResult<ExportJob> {
        let id = self.id;
        let corrupt = |reason: String| StoreError::corrupt(id.clone(), reason);

        let kind: ExportKind = self.kind.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let status: JobStatus = self.status.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let audio_ref: String = serde_json::from_str(&self.audio_ref)
            .map_err(|e| corrupt(format!("audio_ref: {}", e)))?;
        let manifest = serde_json::from_str(&self.manifest)
            .map_err(|e| corrupt(format!("manifest: {}", e)))?;
        let style = serde_json::from_str(&self.style)
            .map_err(|e| corrupt(format!("style: {}", e)))?;
        let timestamp = |ms: i64| {
            DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| corrupt(format!("timestamp out of range: {}", ms)))
        };

        Ok(ExportJob {
            kind,
            user_id: self.user_id,
            audio_ref,
            manifest,
            style,
            status,
            progress: self.progress.clamp(0, 100) as u8,
            output_url: self.output_url,
            output_size: self.output_size.map(|s| s.max(0) as u64),
            error_message: self.error_message,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
            completed_at: self.completed_at.map(timestamp).transpose()?,
            claimed_at: self.claimed_at.map(timestamp).transpose()?,
            worker_id: self.worker_id,
            attempts: self.attempts.max(0) as u32,
            id: JobId::from_string(id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcast_models::{Manifest, Segment, StyleTemplate};

    fn request(kind: ExportKind, user: &str) -> NewExportJob {
        NewExportJob::new(
            kind,
            user,
            "/tmp/input.wav",
            Manifest::new(vec![
                Segment::new("first line", 0, 1500),
                Segment::new("second line", 1600, 3200),
            ]),
            StyleTemplate::default(),
        )
    }

    #[tokio::test]
    async fn test_submit_and_get() {
        let store = JobStore::in_memory().unwrap();
        let id = store.submit(request(ExportKind::Video, "user-1")).await.unwrap();

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.kind, ExportKind::Video);
        assert_eq!(job.progress, 0);
        assert_eq!(job.audio_ref, "/tmp/input.wav");
        assert_eq!(job.manifest.segments.len(), 2);
        assert_eq!(job.attempts, 0);
        assert!(job.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_submit_over_duration_limit_creates_no_row() {
        let store = JobStore::in_memory().unwrap();
        let mut req = request(ExportKind::Video, "user-1");
        req.manifest
            .segments
            .push(Segment::new("too late", 3300, DEFAULT_MAX_DURATION_MS + 1));

        let err = store.submit(req).await.unwrap_err();
        match &err {
            StoreError::InvalidRequest(e) => assert!(e.is_duration_limit()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_client_error());
        assert!(store.list_by_user("user-1", 10).await.unwrap().is_empty());
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let store = JobStore::in_memory().unwrap();
        let first = store.submit(request(ExportKind::Audio, "u")).await.unwrap();
        let second = store.submit(request(ExportKind::Video, "u")).await.unwrap();

        let a = store.claim_next("w1").await.unwrap().unwrap();
        assert_eq!(a.id, first);
        assert_eq!(a.status, JobStatus::Processing);
        assert_eq!(a.worker_id.as_deref(), Some("w1"));
        assert_eq!(a.attempts, 1);
        assert!(a.claimed_at.is_some());

        let b = store.claim_next("w2").await.unwrap().unwrap();
        assert_eq!(b.id, second);

        assert!(store.claim_next("w3").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            database_path: dir.path().join("jobs.db"),
            ..StoreConfig::default()
        };

        let seed = JobStore::open(config.clone()).unwrap();
        let id = seed.submit(request(ExportKind::Video, "u")).await.unwrap();

        // Separate connections, as separate worker processes would have.
        let stores: Vec<JobStore> = (0..8)
            .map(|_| JobStore::open(config.clone()).unwrap())
            .collect();
        let claims = futures::future::join_all(
            stores
                .iter()
                .enumerate()
                .map(|(i, store)| store.claim_next(format!("worker-{i}"))),
        )
        .await;

        let winners: Vec<ExportJob> = claims
            .into_iter()
            .map(|r| r.unwrap())
            .flatten()
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, id);

        let job = seed.get(&id).await.unwrap().unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(job.worker_id, winners[0].worker_id);
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let store = JobStore::in_memory().unwrap();
        let id = store.submit(request(ExportKind::Audio, "u")).await.unwrap();
        store.claim_next("w1").await.unwrap();

        assert!(store
            .update_status(&id, "w1", JobStatus::Completed, StatusUpdate::completed("http://x/a.mp3", 42))
            .await
            .unwrap());
        let done = store.get(&id).await.unwrap().unwrap();
        let completed_at = done.completed_at.unwrap();
        assert_eq!(done.progress, 100);
        assert_eq!(done.output_size, Some(42));

        // Same terminal status again is idempotent and keeps completed_at.
        assert!(store
            .update_status(&id, "w1", JobStatus::Completed, StatusUpdate::default())
            .await
            .unwrap());
        assert_eq!(
            store.get(&id).await.unwrap().unwrap().completed_at,
            Some(completed_at)
        );

        // A different status is refused.
        assert!(!store
            .update_status(&id, "w1", JobStatus::Failed, StatusUpdate::failed("late"))
            .await
            .unwrap());
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_progress_only_while_processing() {
        let store = JobStore::in_memory().unwrap();
        let id = store.submit(request(ExportKind::Audio, "u")).await.unwrap();
        assert!(!store.report_progress(&id, "w1", 15).await.unwrap());

        store.claim_next("w1").await.unwrap();
        assert!(store.report_progress(&id, "w1", 15).await.unwrap());
        assert!(store.report_progress(&id, "w1", 250).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().progress, 100);
        assert!(store.report_progress(&id, "w1", 40).await.unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first() {
        let store = JobStore::in_memory().unwrap();
        let a = store.submit(request(ExportKind::Audio, "alice")).await.unwrap();
        let b = store.submit(request(ExportKind::Video, "alice")).await.unwrap();
        store.submit(request(ExportKind::Video, "bob")).await.unwrap();

        let jobs = store.list_by_user("alice", 10).await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, vec![b, a]);

        assert_eq!(store.list_by_user("alice", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reap_requeues_then_fails() {
        let store = JobStore::in_memory().unwrap();
        let id = store.submit(request(ExportKind::Video, "u")).await.unwrap();

        store.claim_next("w1").await.unwrap().unwrap();
        let report = store.reap_stale(Duration::ZERO, 2).await.unwrap();
        assert_eq!(report.requeued, vec![id.clone()]);
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.worker_id.is_none());

        let again = store.claim_next("w2").await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        let report = store.reap_stale(Duration::ZERO, 2).await.unwrap();
        assert_eq!(report.failed, vec![id.clone()]);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("Worker lost"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_writes_after_reclaim_are_refused() {
        let store = JobStore::in_memory().unwrap();
        let id = store.submit(request(ExportKind::Video, "u")).await.unwrap();

        store.claim_next("w1").await.unwrap().unwrap();
        store.reap_stale(Duration::ZERO, 3).await.unwrap();
        store.claim_next("w2").await.unwrap().unwrap();

        assert!(!store.report_progress(&id, "w1", 70).await.unwrap());
        assert!(!store
            .update_status(&id, "w1", JobStatus::Failed, StatusUpdate::failed("stale"))
            .await
            .unwrap());

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.worker_id.as_deref(), Some("w2"));
        assert_eq!(job.progress, 0);
        assert!(job.error_message.is_none());

        assert!(store.report_progress(&id, "w2", 15).await.unwrap());
        assert!(store
            .update_status(&id, "w2", JobStatus::Completed, StatusUpdate::completed("/files/a.mp4", 7))
            .await
            .unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unclaimed_job_refuses_status_writes() {
        let store = JobStore::in_memory().unwrap();
        let id = store.submit(request(ExportKind::Audio, "u")).await.unwrap();

        assert!(!store
            .update_status(&id, "w1", JobStatus::Completed, StatusUpdate::completed("/x.mp3", 1))
            .await
            .unwrap());
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_reap_ignores_fresh_claims() {
        let store = JobStore::in_memory().unwrap();
        store.submit(request(ExportKind::Video, "u")).await.unwrap();
        store.claim_next("w1").await.unwrap();

        let report = store.reap_stale(Duration::from_secs(600), 3).await.unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_ping() {
        let store = JobStore::in_memory().unwrap();
        store.ping().await.unwrap();
    }
}
