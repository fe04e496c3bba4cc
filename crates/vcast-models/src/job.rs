//! Export job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::manifest::{Manifest, ManifestError};
use crate::style::StyleTemplate;

/// Unique identifier for an export job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What an export produces.
///
/// The submission boundary speaks in container names (`mp3`, `mp4`), the
/// pipeline in media kinds; both spellings deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// Audio-only transcode
    #[serde(alias = "mp3")]
    Audio,
    /// Captioned video with word highlighting
    #[serde(alias = "mp4")]
    Video,
    /// Still-image slides, one per segment
    Carousel,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Audio => "audio",
            ExportKind::Video => "video",
            ExportKind::Carousel => "carousel",
        }
    }

    /// File extension of the final artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportKind::Audio => "mp3",
            ExportKind::Video => "mp4",
            ExportKind::Carousel => "zip",
        }
    }

    /// MIME type of the final artifact.
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportKind::Audio => "audio/mpeg",
            ExportKind::Video => "video/mp4",
            ExportKind::Carousel => "application/zip",
        }
    }

    /// Whether the kind needs the storyboard/render stages.
    pub fn requires_frames(&self) -> bool {
        matches!(self, ExportKind::Video | ExportKind::Carousel)
    }

    /// Rough processing estimate returned to submitters.
    pub fn estimate_processing_secs(&self, duration_ms: u64) -> u64 {
        let secs = duration_ms.div_ceil(1000);
        match self {
            ExportKind::Audio => 5 + secs / 10,
            ExportKind::Video => 15 + secs * 2,
            ExportKind::Carousel => 10 + secs / 5,
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" | "mp3" => Ok(ExportKind::Audio),
            "video" | "mp4" => Ok(ExportKind::Video),
            "carousel" => Ok(ExportKind::Carousel),
            _ => Err(KindParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unsupported export kind: {0}")]
pub struct KindParseError(String);

/// Export job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker to claim it
    #[default]
    Pending,
    /// Claimed by exactly one worker
    Processing,
    /// Output relocated to durable storage
    Completed,
    /// Failed with a captured message
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(StatusParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job status: {0}")]
pub struct StatusParseError(String);

/// A persisted export job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportJob {
    /// Unique job ID
    pub id: JobId,

    /// What to produce
    pub kind: ExportKind,

    /// Submitter ID
    pub user_id: String,

    /// Reference to the input recording (path, URL or storage key)
    pub audio_ref: String,

    /// Word-timed transcript
    pub manifest: Manifest,

    /// Visual style, resolved at submission
    pub style: StyleTemplate,

    /// Lifecycle status
    pub status: JobStatus,

    /// Progress (0-100)
    pub progress: u8,

    /// Public URL of the final artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    /// Size of the final artifact in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp, doubles as the worker heartbeat
    pub updated_at: DateTime<Utc>,

    /// Completed at timestamp (terminal statuses only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// When the current owner claimed the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    /// Current owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    /// Number of claims so far
    #[serde(default)]
    pub attempts: u32,
}

impl ExportJob {
    /// Total program duration the export must cover.
    pub fn duration_ms(&self) -> u64 {
        self.manifest.total_duration_ms()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Fields supplied by the submission boundary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NewExportJob {
    pub kind: ExportKind,
    pub user_id: String,
    pub audio_ref: String,
    pub manifest: Manifest,
    pub style: StyleTemplate,
}

impl NewExportJob {
    pub fn new(
        kind: ExportKind,
        user_id: impl Into<String>,
        audio_ref: impl Into<String>,
        manifest: Manifest,
        style: StyleTemplate,
    ) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            audio_ref: audio_ref.into(),
            manifest,
            style,
        }
    }

    /// Validate the request against the duration ceiling.
    pub fn validate(&self, max_duration_ms: u64) -> Result<(), ValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(ValidationError::MissingField("user_id"));
        }

        if self.audio_ref.trim().is_empty() {
            return Err(ValidationError::MissingField("audio_ref"));
        }

        if self.kind.requires_frames() && self.manifest.segments.is_empty() {
            return Err(ManifestError::Empty.into());
        }

        self.style.validate().map_err(ValidationError::Style)?;
        self.manifest.validate(max_duration_ms)?;

        Ok(())
    }
}

/// Reasons a submission is rejected before any row is created.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Invalid style: {0}")]
    Style(String),
}

impl ValidationError {
    /// Whether the rejection is the duration ceiling.
    pub fn is_duration_limit(&self) -> bool {
        matches!(
            self,
            ValidationError::Manifest(ManifestError::DurationExceeded { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Segment;

    fn manifest() -> Manifest {
        Manifest::new(vec![Segment::new("hello there", 0, 1500)])
    }

    #[test]
    fn test_kind_aliases() {
        let kind: ExportKind = serde_json::from_str("\"mp3\"").unwrap();
        assert_eq!(kind, ExportKind::Audio);
        let kind: ExportKind = serde_json::from_str("\"mp4\"").unwrap();
        assert_eq!(kind, ExportKind::Video);
        assert_eq!("carousel".parse::<ExportKind>().unwrap(), ExportKind::Carousel);
        assert!("gif".parse::<ExportKind>().is_err());
        assert_eq!(ExportKind::Audio.extension(), "mp3");
    }

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_validate_rejects_missing_audio() {
        let job = NewExportJob::new(
            ExportKind::Video,
            "user-1",
            "  ",
            manifest(),
            StyleTemplate::default(),
        );
        assert!(matches!(
            job.validate(60_000),
            Err(ValidationError::MissingField("audio_ref"))
        ));
    }

    #[test]
    fn test_validate_video_needs_segments() {
        let job = NewExportJob::new(
            ExportKind::Video,
            "user-1",
            "in.wav",
            Manifest::new(Vec::new()),
            StyleTemplate::default(),
        );
        assert!(job.validate(60_000).is_err());

        let audio = NewExportJob { kind: ExportKind::Audio, ..job };
        assert!(audio.validate(60_000).is_ok());
    }

    #[test]
    fn test_duration_limit_flag() {
        let job = NewExportJob::new(
            ExportKind::Video,
            "user-1",
            "in.wav",
            Manifest::new(vec![Segment::new("too long", 0, 90_000)]),
            StyleTemplate::default(),
        );
        let err = job.validate(60_000).unwrap_err();
        assert!(err.is_duration_limit());
    }
}
