//! Stale-claim reaper.
//!
//! A worker that dies mid-job leaves its row in `processing` with a
//! heartbeat that stops moving. The reaper puts such jobs back in the queue
//! until they have used up their attempts, then fails them.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vcast_store::{JobStore, ReapReport};

use crate::error::WorkerResult;

/// Run one sweep.
pub async fn reap_once(store: &JobStore, lease: Duration, max_attempts: u32) -> WorkerResult<ReapReport> {
    let report = store.reap_stale(lease, max_attempts).await?;
    for id in &report.requeued {
        info!(job_id = %id, "Requeued job with expired lease");
    }
    for id in &report.failed {
        warn!(job_id = %id, "Failed job after exhausting attempts");
    }
    Ok(report)
}

/// Sweep every `interval` until `shutdown` flips to true.
pub fn spawn_reaper(
    store: JobStore,
    lease: Duration,
    max_attempts: u32,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            if *shutdown.borrow() {
                debug!("Reaper stopping");
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Reaper stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = reap_once(&store, lease, max_attempts).await {
                        warn!("Reaper sweep failed: {}", e);
                    }
                }
            }
        }
    })
}
