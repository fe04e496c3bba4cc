//! Encoding and timing constants shared by the storyboard and the encoder.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default video preset; caption frames are cheap to encode
pub const DEFAULT_PRESET: &str = "veryfast";
/// Tune for mostly-static input
pub const DEFAULT_TUNE: &str = "stillimage";
/// Pixel format playable everywhere
pub const DEFAULT_PIX_FMT: &str = "yuv420p";
/// Audio codec inside mp4
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Audio codec for mp3 exports
pub const MP3_AUDIO_CODEC: &str = "libmp3lame";
/// Audio bitrate for both containers
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Gaps at or below this are absorbed by the next frame.
pub const GAP_THRESHOLD_MS: u64 = 10;
/// Shortest frame the storyboard emits.
pub const MIN_FRAME_MS: u64 = 10;
/// Shortest emphasis sub-frame before splitting is skipped.
pub const MIN_SUB_FRAME_MS: u64 = 60;
/// Upper bound for each leading emphasis sub-frame.
pub const MAX_LEAD_SUB_FRAME_MS: u64 = 80;

/// Output frame-rate ceiling.
pub const MAX_FPS: u32 = 30;

/// Default encoder timeouts.
pub const DEFAULT_AUDIO_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 15 * 60;

/// Adaptive frame-rate tiers: (max frame count, fps).
pub const FPS_TIERS: &[(usize, u32)] = &[(50, 10), (200, 15), (600, 24)];

/// Pick an output frame rate from the number of storyboard frames.
pub fn adaptive_fps(frame_count: usize) -> u32 {
    FPS_TIERS
        .iter()
        .find(|(max, _)| frame_count <= *max)
        .map(|(_, fps)| *fps)
        .unwrap_or(MAX_FPS)
        .min(MAX_FPS)
}

/// Video mux configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    #[serde(default = "default_video_codec")]
    pub codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_tune")]
    pub tune: String,

    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_tune() -> String {
    DEFAULT_TUNE.to_string()
}
fn default_pix_fmt() -> String {
    DEFAULT_PIX_FMT.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            tune: default_tune(),
            pix_fmt: default_pix_fmt(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl EncodingConfig {
    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-tune".to_string(),
            self.tune.clone(),
            "-pix_fmt".to_string(),
            self.pix_fmt.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_fps_tiers() {
        assert_eq!(adaptive_fps(0), 10);
        assert_eq!(adaptive_fps(50), 10);
        assert_eq!(adaptive_fps(51), 15);
        assert_eq!(adaptive_fps(200), 15);
        assert_eq!(adaptive_fps(600), 24);
        assert_eq!(adaptive_fps(601), 30);
        assert_eq!(adaptive_fps(100_000), MAX_FPS);
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = EncodingConfig::default().to_ffmpeg_args();
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"stillimage".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        assert!(args.contains(&"192k".to_string()));
    }
}
