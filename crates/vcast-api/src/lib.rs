//! Axum HTTP API server.
//!
//! This crate provides:
//! - Export submission with validation at the boundary
//! - Job status and per-user listing
//! - Rate limiting and security headers
//! - Health, readiness and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
