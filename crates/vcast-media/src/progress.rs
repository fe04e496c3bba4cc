//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of the program encoded so far, in `0.0..=1.0`.
    pub fn fraction(&self, total_duration_ms: u64) -> f64 {
        if total_duration_ms == 0 || self.out_time_ms <= 0 {
            return if self.is_complete { 1.0 } else { 0.0 };
        }
        (self.out_time_ms as f64 / total_duration_ms as f64).min(1.0)
    }

    /// Map encode progress onto a slice of the job's 0-100 progress scale.
    pub fn job_progress(&self, total_duration_ms: u64, from: u8, to: u8) -> u8 {
        let span = to.saturating_sub(from) as f64;
        (from as f64 + span * self.fraction(total_duration_ms)).round() as u8
    }
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn Fn(FfmpegProgress) + Send + 'static>;
