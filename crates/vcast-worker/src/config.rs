//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vcast_models::encoding::{DEFAULT_AUDIO_TIMEOUT_SECS, DEFAULT_VIDEO_TIMEOUT_SECS};
use vcast_media::RenderPool;
use vcast_storage::DEFAULT_MAX_INPUT_BYTES;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between claim attempts when nothing is pending
    pub poll_interval: Duration,
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Render pool size
    pub render_threads: usize,
    /// Hard limit for the mp3 transcode
    pub audio_timeout: Duration,
    /// Hard limit for the video mux
    pub video_timeout: Duration,
    /// Timeout for fetching remote inputs
    pub download_timeout: Duration,
    /// Stage host paths and `file://` references (trusted deployments only)
    pub allow_local_inputs: bool,
    /// Largest input the worker will stage
    pub max_input_bytes: u64,
    /// A processing job with no heartbeat for this long is considered lost
    pub lease: Duration,
    /// Claims allowed before a lost job is failed instead of requeued
    pub max_attempts: u32,
    /// How often the reaper runs
    pub reap_interval: Duration,
    /// Short side of rendered frames in pixels
    pub canvas_short_side: u32,
    /// Optional Prometheus listener port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            work_dir: std::env::temp_dir().join("vcast"),
            render_threads: RenderPool::default_size(),
            audio_timeout: Duration::from_secs(DEFAULT_AUDIO_TIMEOUT_SECS),
            video_timeout: Duration::from_secs(DEFAULT_VIDEO_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(120),
            allow_local_inputs: false,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            lease: Duration::from_secs(600),
            max_attempts: 3,
            reap_interval: Duration::from_secs(60),
            canvas_short_side: 1080,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            render_threads: std::env::var("WORKER_RENDER_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.render_threads),
            audio_timeout: Duration::from_secs(
                std::env::var("WORKER_AUDIO_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_AUDIO_TIMEOUT_SECS),
            ),
            video_timeout: Duration::from_secs(
                std::env::var("WORKER_VIDEO_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_VIDEO_TIMEOUT_SECS),
            ),
            download_timeout: Duration::from_secs(
                std::env::var("WORKER_DOWNLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            allow_local_inputs: std::env::var("WORKER_ALLOW_LOCAL_INPUTS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            max_input_bytes: std::env::var("WORKER_MAX_INPUT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_INPUT_BYTES),
            lease: Duration::from_secs(
                std::env::var("WORKER_LEASE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_attempts: std::env::var("WORKER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            reap_interval: Duration::from_secs(
                std::env::var("WORKER_REAP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            canvas_short_side: std::env::var("WORKER_CANVAS_SHORT_SIDE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1080),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Interval at which a running job refreshes its heartbeat.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.lease / 3).max(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.audio_timeout, Duration::from_secs(300));
        assert_eq!(config.video_timeout, Duration::from_secs(900));
        assert!(config.render_threads >= 2);
        assert!(!config.allow_local_inputs);
        assert_eq!(config.max_input_bytes, 500 * 1024 * 1024);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(200));
    }
}
