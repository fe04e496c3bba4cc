//! Job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use vcast_media::RenderPool;
use vcast_models::{ExportJob, JobStatus};
use vcast_storage::ArtifactStorage;
use vcast_store::{JobStore, StatusUpdate};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::ExportPipeline;
use crate::reaper::spawn_reaper;

/// Longest pause between retries while the store is unreachable.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Claims export jobs one at a time and runs them through the pipeline.
pub struct JobExecutor {
    config: Arc<WorkerConfig>,
    store: JobStore,
    pipeline: ExportPipeline,
    pool: Arc<RenderPool>,
    shutdown: watch::Sender<bool>,
    worker_id: String,
}

impl JobExecutor {
    /// Create a new job executor around a started render pool.
    pub fn new(
        config: WorkerConfig,
        store: JobStore,
        storage: Arc<dyn ArtifactStorage>,
        pool: Arc<RenderPool>,
    ) -> WorkerResult<Self> {
        let config = Arc::new(config);
        let pipeline = ExportPipeline::new(
            Arc::clone(&config),
            store.clone(),
            storage,
            Arc::clone(&pool),
        )?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            pipeline,
            pool,
            shutdown,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Sender that stops [`run`](Self::run) when set to `true`.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    /// Ask the executor to stop after the in-flight job.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Poll for jobs until shutdown, then terminate the render pool.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} render threads",
            self.worker_id,
            self.pool.workers()
        );

        let reaper = spawn_reaper(
            self.store.clone(),
            self.config.lease,
            self.config.max_attempts,
            self.config.reap_interval,
            self.shutdown.subscribe(),
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut backoff = self.config.poll_interval;

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            let wait = match self.run_once().await {
                // Keep draining while there is work.
                Ok(true) => {
                    backoff = self.config.poll_interval;
                    continue;
                }
                Ok(false) => {
                    backoff = self.config.poll_interval;
                    self.config.poll_interval
                }
                Err(e) => {
                    error!("Error polling for jobs: {}", e);
                    metrics::record_poll_error();
                    let wait = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    wait
                }
            };

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let _ = reaper.await;

        // Joining render threads blocks.
        let pool = Arc::clone(&self.pool);
        if let Err(e) = tokio::task::spawn_blocking(move || pool.terminate()).await {
            warn!("Render pool did not shut down cleanly: {}", e);
        }
        info!("Job executor stopped");
        Ok(())
    }

    /// Claim and run at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        let Some(job) = self.store.claim_next(&self.worker_id).await? else {
            return Ok(false);
        };

        let span = JobLogger::for_job(&job).create_span();
        self.execute(job).instrument(span).await?;
        Ok(true)
    }

    /// Run the pipeline and record the terminal status.
    async fn execute(&self, job: ExportJob) -> WorkerResult<()> {
        let logger = JobLogger::for_job(&job);
        logger.log_start(&format!("attempt {} on {}", job.attempts, self.worker_id));

        metrics::set_in_flight(true);
        let started = Instant::now();
        let result = self.pipeline.process(&job).await;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::set_in_flight(false);
        metrics::record_job(job.kind.as_str(), result.is_ok(), elapsed);

        let (status, update) = match result {
            Ok(artifact) => {
                logger.log_completion(&format!("{} in {:.1}s", artifact.url, elapsed));
                (
                    JobStatus::Completed,
                    StatusUpdate::completed(artifact.url, artifact.size),
                )
            }
            Err(e) if e.is_lease_lost() => {
                logger.log_warning(&format!("abandoning job: {}", e));
                return Ok(());
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                (JobStatus::Failed, StatusUpdate::failed(e.to_string()))
            }
        };

        if !self
            .store
            .update_status(&job.id, &self.worker_id, status, update)
            .await?
        {
            logger.log_warning("lease lost before the result was recorded; status not written");
        }
        Ok(())
    }
}
