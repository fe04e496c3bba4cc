//! Export worker.
//!
//! This crate provides:
//! - A poll loop that claims export jobs from the job store
//! - The export pipeline (stage, storyboard, render, encode, store)
//! - Per-job scratch tracking and cleanup
//! - Lease heartbeats and a stale-claim reaper
//! - Graceful shutdown

pub mod artifacts;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reaper;

pub use artifacts::{scratch_dir_name, ArtifactTracker, CleanupReport};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{milestones, ExportPipeline};
pub use reaper::{reap_once, spawn_reaper};
