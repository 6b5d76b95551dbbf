//! Axum HTTP API server.
//!
//! This crate provides:
//! - Tactical analysis endpoint orchestrating the Gemini file lifecycle
//! - Presigned upload/read URL issuance for the clip bucket
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use config::{AnalysisConfig, ApiConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::AnalysisService;
pub use state::AppState;
