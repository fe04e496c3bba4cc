//! Durable job store for export jobs.
//!
//! This crate provides:
//! - A SQLite-backed job table with typed status columns
//! - Atomic FIFO claiming for competing workers
//! - Idempotent status transitions and progress heartbeats
//! - Stale-claim reaping for workers that disappeared mid-job

pub mod error;
pub mod metrics;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{JobStore, ReapReport, StatusUpdate, StoreConfig, DEFAULT_MAX_DURATION_MS};
