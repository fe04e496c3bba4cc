#![deny(unreachable_patterns)]
//! Media pipeline for VoiceCast exports.
//!
//! This crate provides:
//! - Storyboards: manifest timing into contiguous karaoke frames
//! - A fixed-size OS-thread render pool with a PNG caption rasterizer
//! - Type-safe FFmpeg command building with timeouts and progress parsing
//! - mp3 transcoding, concat-list muxing and carousel packaging

pub mod carousel;
pub mod command;
pub mod encode;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod progress;
pub mod render;
pub mod storyboard;

pub use carousel::package_slides;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encode::{
    concat_list, mux_frames, mux_frames_with_progress, transcode_audio, write_concat_list,
};
pub use error::{MediaError, MediaResult, RenderError};
pub use probe::{probe_duration_ms, probe_media, MediaInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use render::{
    render_frames, CaptionRasterizer, FrameRasterizer, RenderHandle, RenderPool, RenderTask,
    RenderedFrame, Scheduler,
};
pub use storyboard::{
    build_slides, build_storyboard, FrameDescriptor, FrameKind, FrameScene, SceneWord,
    Storyboard, StoryboardOptions, WordState,
};
pub use vcast_models::encoding::adaptive_fps;
