//! Input staging and durable storage for export artifacts.
//!
//! This crate provides:
//! - An `ArtifactStorage` trait with local-directory and Cloudflare R2 backends
//! - Input staging from HTTP(S), `file://`, plain paths and `r2://` keys
//! - Cross-device safe file relocation

pub mod backend;
pub mod client;
pub mod error;
pub mod fs_utils;
pub mod local;
pub mod staging;

pub use backend::{
    artifact_key, storage_from_env, upload_key, ArtifactStorage, StorageBackend, StoredArtifact,
};
pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use fs_utils::move_file;
pub use local::{LocalStorage, LocalStorageConfig};
pub use staging::{InputSource, InputStager, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_MAX_INPUT_BYTES};
