//! Administrative maintenance routes

use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

use super::auth::RequireAdmin;
use super::types::CleanupResponse;

/// POST /api/v1/admin/cleanup-tokens (Admin only)
///
/// On-demand variant of the scheduled expired-token sweep.
async fn cleanup_tokens(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let deleted = state.sessions.cleanup_expired().await?;

    info!("On-demand cleanup removed {} expired token(s)", deleted);
    Ok(Json(CleanupResponse { deleted }))
}

/// Create admin routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/admin/cleanup-tokens", post(cleanup_tokens))
}
