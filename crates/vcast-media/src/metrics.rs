//! Media metrics: frame rendering and encoder runs.

use metrics::{counter, gauge, histogram};

pub mod names {
    /// Frames rasterized by outcome.
    pub const FRAMES_TOTAL: &str = "render_frames_total";

    /// Per-frame rasterization time in seconds.
    pub const FRAME_SECONDS: &str = "render_frame_seconds";

    /// Tasks waiting for a render worker.
    pub const QUEUE_DEPTH: &str = "render_queue_depth";

    /// Encoder runs by operation and outcome.
    pub const ENCODES_TOTAL: &str = "encode_runs_total";

    /// Encoder wall time in seconds by operation.
    pub const ENCODE_SECONDS: &str = "encode_duration_seconds";
}

pub fn record_frame(ok: bool, latency_ms: f64) {
    counter!(names::FRAMES_TOTAL, "status" => if ok { "ok" } else { "error" }).increment(1);
    histogram!(names::FRAME_SECONDS).record(latency_ms / 1000.0);
}

pub fn set_queue_depth(depth: usize) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

pub fn record_encode(operation: &'static str, ok: bool, latency_ms: f64) {
    counter!(
        names::ENCODES_TOTAL,
        "operation" => operation,
        "status" => if ok { "ok" } else { "error" }
    )
    .increment(1);
    histogram!(names::ENCODE_SECONDS, "operation" => operation).record(latency_ms / 1000.0);
}
