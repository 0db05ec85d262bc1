//! Passage REST API
//!
//! This crate provides the Axum-based HTTP API for Passage: the
//! authentication routes, the per-request auth gate, and user management.

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
