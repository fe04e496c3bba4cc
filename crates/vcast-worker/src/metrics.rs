//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

pub mod names {
    /// Finished jobs by kind and outcome.
    pub const JOBS_TOTAL: &str = "vcast_worker_jobs_total";

    /// Wall time per job in seconds, by kind.
    pub const JOB_DURATION_SECONDS: &str = "vcast_worker_job_duration_seconds";

    /// 1 while a job is being processed.
    pub const JOBS_IN_FLIGHT: &str = "vcast_worker_jobs_in_flight";

    /// Poll loop errors talking to the job store.
    pub const POLL_ERRORS_TOTAL: &str = "vcast_worker_poll_errors_total";
}

/// Serve `/metrics` on `port` from a background listener.
pub fn install_exporter(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Prometheus exporter: {}", e)))
}

pub fn record_job(kind: &'static str, ok: bool, duration_secs: f64) {
    counter!(
        names::JOBS_TOTAL,
        "kind" => kind,
        "status" => if ok { "completed" } else { "failed" }
    )
    .increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind).record(duration_secs);
}

pub fn set_in_flight(active: bool) {
    gauge!(names::JOBS_IN_FLIGHT).set(if active { 1.0 } else { 0.0 });
}

pub fn record_poll_error() {
    counter!(names::POLL_ERRORS_TOTAL).increment(1);
}
