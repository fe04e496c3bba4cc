//! Shared data models for the VoiceCast export pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Export jobs, their kinds and lifecycle status
//! - Timing manifests (segments and word timestamps)
//! - Style templates and the built-in template catalog
//! - Encoding constants shared by the worker and the API

pub mod encoding;
pub mod job;
pub mod manifest;
pub mod style;

// Re-export common types
pub use encoding::{adaptive_fps, EncodingConfig};
pub use job::{ExportJob, ExportKind, JobId, JobStatus, NewExportJob, ValidationError};
pub use manifest::{Manifest, ManifestError, Segment, Word};
pub use style::{
    AnimationMode, AspectRatio, Background, Color, Layout, StyleTemplate, TemplateNotFound,
    Typography, VerticalAnchor,
};
