//! Job store metrics.
//!
//! - Operation counters by operation and outcome
//! - Latency histograms
//! - Claim outcomes

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total store operations by operation and status.
    pub const OPERATIONS_TOTAL: &str = "job_store_operations_total";

    /// Operation latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "job_store_latency_seconds";

    /// Claim attempts by outcome (claimed, empty).
    pub const CLAIMS_TOTAL: &str = "job_store_claims_total";

    /// Jobs requeued or failed by the reaper.
    pub const REAPED_TOTAL: &str = "job_store_reaped_total";
}

/// Record metrics for a completed store operation.
pub fn record_operation(operation: &'static str, ok: bool, latency_ms: f64) {
    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation).record(latency_ms / 1000.0);
}

pub fn record_claim(claimed: bool) {
    counter!(
        names::CLAIMS_TOTAL,
        "outcome" => if claimed { "claimed" } else { "empty" }
    )
    .increment(1);
}

pub fn record_reaped(requeued: usize, failed: usize) {
    counter!(names::REAPED_TOTAL, "action" => "requeued").increment(requeued as u64);
    counter!(names::REAPED_TOTAL, "action" => "failed").increment(failed as u64);
}
