//! Export encoding: mp3 transcode and frame-sequence muxing.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::info;
use vcast_models::encoding::{EncodingConfig, DEFAULT_AUDIO_BITRATE, MP3_AUDIO_CODEC};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::progress::FfmpegProgress;
use crate::render::RenderedFrame;

/// Transcode any audio input to mp3.
pub async fn transcode_audio(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timeout: Duration,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    let cmd = FfmpegCommand::new(input, output)
        .no_video()
        .audio_codec(MP3_AUDIO_CODEC)
        .audio_bitrate(DEFAULT_AUDIO_BITRATE)
        .log_level("error");

    let started = Instant::now();
    let result = FfmpegRunner::new().with_timeout(timeout).run(&cmd).await;
    metrics::record_encode("transcode_audio", result.is_ok(), elapsed_ms(started));
    result?;

    info!("Transcoded {} to mp3", input.display());
    Ok(())
}

/// Write an ffconcat list for `frames`, which must be in playback order.
pub async fn write_concat_list(frames: &[RenderedFrame], path: impl AsRef<Path>) -> MediaResult<()> {
    let list = concat_list(frames)?;
    tokio::fs::write(path.as_ref(), list).await?;
    Ok(())
}

/// ffconcat text: one `file`/`duration` pair per frame, then the last file
/// again without a duration so its duration is honoured.
pub fn concat_list(frames: &[RenderedFrame]) -> MediaResult<String> {
    let last = frames
        .last()
        .ok_or_else(|| MediaError::invalid_storyboard("no frames to encode"))?;

    let mut list = String::from("ffconcat version 1.0\n");
    for frame in frames {
        let _ = writeln!(list, "file {}", quote_path(&absolute(&frame.path)?));
        let _ = writeln!(list, "duration {:.3}", frame.duration_ms as f64 / 1000.0);
    }
    let _ = writeln!(list, "file {}", quote_path(&absolute(&last.path)?));
    Ok(list)
}

fn absolute(path: &Path) -> MediaResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Single-quote a path for the concat demuxer.
fn quote_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Mux a frame sequence with the source audio into an H.264/AAC mp4.
pub async fn mux_frames(
    concat_list: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fps: u32,
    timeout: Duration,
) -> MediaResult<()> {
    mux_frames_with_progress(concat_list, audio, output, fps, timeout, |_| {}).await
}

/// [`mux_frames`] with encoder progress reporting.
pub async fn mux_frames_with_progress<F>(
    concat_list: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fps: u32,
    timeout: Duration,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let output = output.as_ref();
    let cmd = mux_command(concat_list.as_ref(), audio.as_ref(), output, fps, &EncodingConfig::default());

    let started = Instant::now();
    let result = FfmpegRunner::new()
        .with_timeout(timeout)
        .run_with_progress(&cmd, on_progress)
        .await;
    metrics::record_encode("mux_frames", result.is_ok(), elapsed_ms(started));
    result?;

    info!("Encoded {} at {} fps", output.display(), fps);
    Ok(())
}

fn mux_command(
    concat_list: &Path,
    audio: &Path,
    output: &Path,
    fps: u32,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(concat_list, output)
        .concat_demuxer()
        .add_input(audio)
        .map("0:v:0")
        .map("1:a:0")
        .frame_rate(fps)
        .output_args(encoding.to_ffmpeg_args())
        .shortest()
        .faststart()
        .log_level("error")
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize, path: &str, duration_ms: u64) -> RenderedFrame {
        RenderedFrame {
            index,
            path: PathBuf::from(path),
            duration_ms,
        }
    }

    #[test]
    fn test_concat_list_repeats_last_file() {
        let frames = vec![
            frame(0, "/tmp/job/frame_00000.png", 500),
            frame(1, "/tmp/job/frame_00001.png", 1250),
            frame(2, "/tmp/job/frame_00002.png", 10),
        ];

        let list = concat_list(&frames).unwrap();
        let lines: Vec<&str> = list.lines().collect();

        assert_eq!(
            lines,
            vec![
                "ffconcat version 1.0",
                "file '/tmp/job/frame_00000.png'",
                "duration 0.500",
                "file '/tmp/job/frame_00001.png'",
                "duration 1.250",
                "file '/tmp/job/frame_00002.png'",
                "duration 0.010",
                "file '/tmp/job/frame_00002.png'",
            ]
        );
    }

    #[test]
    fn test_concat_list_quotes_and_absolutizes() {
        let list = concat_list(&[frame(0, "it's/frame.png", 100)]).unwrap();
        let first = list.lines().nth(1).unwrap();
        assert!(first.starts_with("file '/"));
        assert!(first.ends_with(r"it'\''s/frame.png'"));
    }

    #[test]
    fn test_concat_list_requires_frames() {
        assert!(matches!(
            concat_list(&[]),
            Err(MediaError::InvalidStoryboard(_))
        ));
    }

    #[test]
    fn test_mux_command_args() {
        let cmd = mux_command(
            Path::new("/w/frames.txt"),
            Path::new("/w/audio.m4a"),
            Path::new("/w/out.mp4"),
            15,
            &EncodingConfig::default(),
        );
        let args = cmd.build_args().join(" ");

        assert!(args.contains("-f concat -safe 0 -i /w/frames.txt -i /w/audio.m4a"));
        assert!(args.contains("-r 15"));
        assert!(args.contains("-c:v libx264"));
        assert!(args.contains("-tune stillimage"));
        assert!(args.contains("-pix_fmt yuv420p"));
        assert!(args.contains("-c:a aac"));
        assert!(args.contains("-shortest"));
        assert!(args.contains("-movflags +faststart"));
        assert!(args.ends_with("/w/out.mp4"));
    }

    #[tokio::test]
    async fn test_write_concat_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.txt");
        write_concat_list(&[frame(0, "/a.png", 40)], &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ffconcat version 1.0\n"));
        assert!(text.contains("duration 0.040"));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_transcode_and_mux_with_ffmpeg() {
        use crate::probe::probe_media;

        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("tone.wav");
        let tone = FfmpegCommand::new("sine=frequency=440:duration=2", &wav)
            .input_args(["-f", "lavfi"])
            .log_level("error");
        FfmpegRunner::new().run(&tone).await.unwrap();

        let mp3 = dir.path().join("tone.mp3");
        transcode_audio(&wav, &mp3, Duration::from_secs(60)).await.unwrap();
        let info = probe_media(&mp3).await.unwrap();
        assert_eq!(info.audio.as_ref().unwrap().codec, "mp3");
        assert!(!info.has_video());

        let png = dir.path().join("frame_00000.png");
        image::RgbaImage::from_pixel(64, 64, image::Rgba([0, 0, 0, 255]))
            .save(&png)
            .unwrap();
        let list = dir.path().join("frames.txt");
        write_concat_list(&[RenderedFrame { index: 0, path: png, duration_ms: 2000 }], &list)
            .await
            .unwrap();

        let mp4 = dir.path().join("out.mp4");
        mux_frames(&list, &wav, &mp4, 10, Duration::from_secs(120)).await.unwrap();
        let info = probe_media(&mp4).await.unwrap();
        assert!(info.has_video() && info.has_audio());
        assert!((info.duration_ms as i64 - 2000).abs() <= 100);
    }
}
