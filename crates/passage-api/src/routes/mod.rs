//! API routes
//!
//! A route is public exactly when its handler takes no auth extractor;
//! protected routes declare their requirement through `RequireAuth` or
//! `RequireAdmin` in the handler signature.

mod admin;
mod auth;
mod health;
pub mod metrics;
mod types;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

// Re-export commonly used types for external use
pub use auth::{AuthUser, RequireAdmin, RequireAuth};
pub use types::*;

/// Create the main router
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        // Health check
        .merge(health::routes())
        // Authentication & sessions
        .merge(auth::routes())
        // User management
        .merge(users::routes())
        // Maintenance
        .merge(admin::routes())
        .with_state(state);

    // Add metrics endpoint if handle is provided
    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}
