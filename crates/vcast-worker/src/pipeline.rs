//! Export pipeline: stage, branch by kind, relocate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vcast_media::{
    adaptive_fps, build_slides, build_storyboard, mux_frames_with_progress, package_slides,
    probe_duration_ms, render_frames, transcode_audio, write_concat_list, FfmpegProgress,
    FrameDescriptor, RenderPool, RenderedFrame, StoryboardOptions,
};
use vcast_models::{ExportJob, ExportKind, JobId};
use vcast_storage::{artifact_key, ArtifactStorage, InputSource, InputStager, StoredArtifact};
use vcast_store::JobStore;

use crate::artifacts::ArtifactTracker;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Progress milestones on the job's 0-100 scale.
pub mod milestones {
    pub const CLAIMED: u8 = 5;
    pub const STAGED: u8 = 15;
    pub const STORYBOARD: u8 = 25;
    pub const RENDERED: u8 = 70;
    pub const ENCODED: u8 = 90;
    pub const COMPLETED: u8 = 100;
}

/// Runs one claimed job from staged input to stored artifact.
pub struct ExportPipeline {
    config: Arc<WorkerConfig>,
    store: JobStore,
    storage: Arc<dyn ArtifactStorage>,
    stager: InputStager,
    pool: Arc<RenderPool>,
}

impl ExportPipeline {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: JobStore,
        storage: Arc<dyn ArtifactStorage>,
        pool: Arc<RenderPool>,
    ) -> WorkerResult<Self> {
        let stager = InputStager::new(config.download_timeout)?
            .with_local_paths(config.allow_local_inputs)
            .with_max_bytes(config.max_input_bytes);
        Ok(Self {
            config,
            store,
            storage,
            stager,
            pool,
        })
    }

    /// Process a claimed job. Scratch files are removed on every exit path.
    ///
    /// Returns [`WorkerError::LeaseLost`] as soon as a progress write shows
    /// the claim has moved to another worker.
    pub async fn process(&self, job: &ExportJob) -> WorkerResult<StoredArtifact> {
        let logger = JobLogger::for_job(job);
        let worker_id = job
            .worker_id
            .clone()
            .ok_or_else(|| WorkerError::invalid_job("job has not been claimed"))?;
        let mut tracker =
            ArtifactTracker::create(&self.config.work_dir, &job.id, job.attempts).await?;
        let progress = ProgressReporter::start(
            self.store.clone(),
            job.id.clone(),
            worker_id,
            self.config.heartbeat_interval(),
        );

        let result = self.run(job, &mut tracker, &progress, &logger).await;
        drop(progress);

        let report = tracker.cleanup().await;
        if !report.is_clean() {
            logger.log_warning(&format!(
                "{} scratch paths could not be removed",
                report.failed.len()
            ));
        }
        result
    }

    async fn run(
        &self,
        job: &ExportJob,
        tracker: &mut ArtifactTracker,
        progress: &ProgressReporter,
        logger: &JobLogger,
    ) -> WorkerResult<StoredArtifact> {
        progress.set(milestones::CLAIMED).await?;

        // Carousels are pure stills and never read the audio.
        let input = match job.kind {
            ExportKind::Carousel => None,
            ExportKind::Audio | ExportKind::Video => Some(self.stage(job, tracker).await?),
        };
        progress.set(milestones::STAGED).await?;
        logger.log_progress("input staged");

        let output = match (job.kind, input) {
            (ExportKind::Audio, Some(input)) => self.export_audio(&input, tracker).await?,
            (ExportKind::Video, Some(input)) => {
                self.export_video(job, &input, tracker, progress, logger).await?
            }
            (ExportKind::Carousel, _) => self.export_carousel(job, tracker, progress).await?,
            (_, None) => return Err(WorkerError::invalid_job("input was not staged")),
        };
        progress.set(milestones::ENCODED).await?;

        let key = artifact_key(&job.user_id, &job.id, job.kind);
        let artifact = self
            .storage
            .store(&output, &key, job.kind.content_type())
            .await
            .map_err(WorkerError::output_failed)?;
        if artifact.size == 0 {
            return Err(WorkerError::output_failed(format!("{} is empty", artifact.key)));
        }

        logger.log_progress(&format!("stored {} ({} bytes)", artifact.key, artifact.size));
        Ok(artifact)
    }

    async fn stage(&self, job: &ExportJob, tracker: &mut ArtifactTracker) -> WorkerResult<PathBuf> {
        let source = InputSource::parse(&job.audio_ref).map_err(WorkerError::staging_failed)?;
        let ext = source.extension().unwrap_or_else(|| "audio".to_string());
        let input = tracker.path(&format!("input.{}", ext));

        self.stager
            .stage(&job.audio_ref, &input, self.storage.as_ref())
            .await
            .map_err(WorkerError::staging_failed)?;
        Ok(input)
    }

    async fn export_audio(&self, input: &Path, tracker: &mut ArtifactTracker) -> WorkerResult<PathBuf> {
        let output = tracker.path("output.mp3");
        transcode_audio(input, &output, self.config.audio_timeout)
            .await
            .map_err(WorkerError::encoding_failed)?;
        Ok(output)
    }

    async fn export_video(
        &self,
        job: &ExportJob,
        input: &Path,
        tracker: &mut ArtifactTracker,
        progress: &ProgressReporter,
        logger: &JobLogger,
    ) -> WorkerResult<PathBuf> {
        let probed = match job.manifest.duration_ms {
            Some(_) => None,
            None => match probe_duration_ms(input).await {
                Ok(ms) => Some(ms),
                Err(e) => {
                    logger.log_warning(&format!("could not probe input duration: {}", e));
                    None
                }
            },
        };
        let total_ms = job.manifest.resolve_duration_ms(probed);
        if total_ms == 0 {
            return Err(WorkerError::invalid_job("could not determine program duration"));
        }
        let ceiling = self.store.config().max_duration_ms;
        if total_ms > ceiling {
            return Err(WorkerError::invalid_job(format!(
                "program is {}ms, longer than the {}ms limit",
                total_ms, ceiling
            )));
        }

        let storyboard = build_storyboard(&job.manifest, &job.style, total_ms, &self.options())
            .map_err(WorkerError::render_failed)?;
        progress.set(milestones::STORYBOARD).await?;
        logger.log_progress(&format!(
            "storyboard has {} frames at {}x{}",
            storyboard.len(),
            storyboard.width,
            storyboard.height
        ));

        let frames = self.render(&storyboard.frames, tracker).await?;
        progress.set(milestones::RENDERED).await?;

        let list = tracker.path("frames.ffconcat");
        write_concat_list(&frames, &list)
            .await
            .map_err(WorkerError::encoding_failed)?;

        let output = tracker.path("output.mp4");
        let fps = adaptive_fps(frames.len());
        mux_frames_with_progress(
            &list,
            input,
            &output,
            fps,
            self.config.video_timeout,
            progress.encode_callback(milestones::RENDERED, milestones::ENCODED, total_ms),
        )
        .await
        .map_err(WorkerError::encoding_failed)?;
        Ok(output)
    }

    async fn export_carousel(
        &self,
        job: &ExportJob,
        tracker: &mut ArtifactTracker,
        progress: &ProgressReporter,
    ) -> WorkerResult<PathBuf> {
        let slides = build_slides(&job.manifest, &job.style, &self.options())
            .map_err(WorkerError::render_failed)?;
        progress.set(milestones::STORYBOARD).await?;

        let rendered = self.render(&slides, tracker).await?;
        progress.set(milestones::RENDERED).await?;

        let output = tracker.path("output.zip");
        package_slides(&rendered, &output)
            .await
            .map_err(WorkerError::encoding_failed)?;
        Ok(output)
    }

    /// Render into `<scratch>/frames`, tracking every frame file up front.
    async fn render(
        &self,
        frames: &[FrameDescriptor],
        tracker: &mut ArtifactTracker,
    ) -> WorkerResult<Vec<RenderedFrame>> {
        let dir = tracker.dir().join("frames");
        tokio::fs::create_dir_all(&dir).await?;
        for frame in frames {
            tracker.track(dir.join(frame.file_name()));
        }

        debug!("Rendering {} frames on {} workers", frames.len(), self.pool.workers());
        render_frames(&self.pool, frames, &dir)
            .await
            .map_err(WorkerError::render_failed)
    }

    fn options(&self) -> StoryboardOptions {
        StoryboardOptions {
            canvas_short_side: self.config.canvas_short_side,
            ..StoryboardOptions::default()
        }
    }
}

/// Publishes monotonic progress and refreshes the job's heartbeat while the
/// pipeline runs. Any write the store refuses marks the lease as lost.
struct ProgressReporter {
    store: JobStore,
    job_id: JobId,
    worker_id: Arc<str>,
    current: Arc<AtomicU8>,
    lost: Arc<AtomicBool>,
    heartbeat: JoinHandle<()>,
}

impl ProgressReporter {
    fn start(store: JobStore, job_id: JobId, worker_id: String, interval: Duration) -> Self {
        let worker_id: Arc<str> = worker_id.into();
        let current = Arc::new(AtomicU8::new(0));
        let lost = Arc::new(AtomicBool::new(false));

        let heartbeat = {
            let store = store.clone();
            let job_id = job_id.clone();
            let worker_id = Arc::clone(&worker_id);
            let current = Arc::clone(&current);
            let lost = Arc::clone(&lost);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let progress = current.load(Ordering::Relaxed);
                    match store.report_progress(&job_id, &worker_id, progress).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(job_id = %job_id, "Heartbeat refused; claim moved to another worker");
                            lost.store(true, Ordering::Relaxed);
                            break;
                        }
                        Err(e) => warn!(job_id = %job_id, "Heartbeat failed: {}", e),
                    }
                }
            })
        };

        Self {
            store,
            job_id,
            worker_id,
            current,
            lost,
            heartbeat,
        }
    }

    /// Fail fast when the claim is gone.
    fn ensure_owned(&self) -> WorkerResult<()> {
        if self.lost.load(Ordering::Relaxed) {
            return Err(WorkerError::lease_lost(format!(
                "{} no longer holds job {}",
                self.worker_id, self.job_id
            )));
        }
        Ok(())
    }

    async fn set(&self, progress: u8) -> WorkerResult<()> {
        self.ensure_owned()?;
        let previous = self.current.fetch_max(progress, Ordering::Relaxed);
        if progress <= previous {
            return Ok(());
        }
        match self
            .store
            .report_progress(&self.job_id, &self.worker_id, progress)
            .await
        {
            Ok(true) => {}
            Ok(false) => self.lost.store(true, Ordering::Relaxed),
            Err(e) => {
                warn!(job_id = %self.job_id, "Failed to report progress {}: {}", progress, e)
            }
        }
        self.ensure_owned()
    }

    /// Encoder callback mapping ffmpeg's position onto `from..=to`.
    fn encode_callback(&self, from: u8, to: u8, total_ms: u64) -> impl Fn(FfmpegProgress) + Send + 'static {
        let store = self.store.clone();
        let job_id = self.job_id.clone();
        let worker_id = Arc::clone(&self.worker_id);
        let current = Arc::clone(&self.current);
        let lost = Arc::clone(&self.lost);

        move |update: FfmpegProgress| {
            let progress = update.job_progress(total_ms, from, to);
            if progress <= current.fetch_max(progress, Ordering::Relaxed) {
                return;
            }
            let store = store.clone();
            let job_id = job_id.clone();
            let worker_id = Arc::clone(&worker_id);
            let lost = Arc::clone(&lost);
            tokio::spawn(async move {
                match store.report_progress(&job_id, &worker_id, progress).await {
                    Ok(true) => {}
                    Ok(false) => lost.store(true, Ordering::Relaxed),
                    Err(e) => debug!(job_id = %job_id, "Encode progress not recorded: {}", e),
                }
            });
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}
