//! Axum HTTP API server.
//!
//! This crate provides:
//! - Project submission and inspection endpoints
//! - Worker callback endpoints routed through the status update gateway
//! - Segment edit and re-dispatch endpoints
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
