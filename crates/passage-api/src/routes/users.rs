//! User management routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use passage_auth::hash_password;
use passage_core::normalize_email;
use passage_db::NewUser;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

use super::auth::{validate_display_name, validate_email, validate_password};
use super::auth::{RequireAdmin, RequireAuth};
use super::types::{CreateUserRequest, UpdateProfileRequest, UpdateUserRequest, UserResponse};

// ==================== User Routes ====================

/// GET /api/v1/users (Admin only)
async fn list_users(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.db.list_users().await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/v1/users (Admin only)
async fn create_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_email(&request.email)?;
    validate_password(&request.password)?;
    validate_display_name(&request.display_name)?;

    debug!("Creating user: {}", request.email);

    let role = request
        .role
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid role: {}", request.role)))?;

    let password_hash = hash_password(&request.password)?;

    let user = state
        .db
        .insert_user(NewUser {
            email: normalize_email(&request.email),
            password_hash,
            display_name: request.display_name,
            role,
        })
        .await?;

    info!("Created user: {}", user.email);

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/v1/users/{id} (Admin only)
async fn get_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User: {}", id)))?;

    Ok(Json(user.into()))
}

/// PUT /api/v1/users/{id} (Admin only)
async fn update_user(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    debug!("Updating user: {}", id);

    // Verify user exists
    state
        .db
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User: {}", id)))?;

    // Update role if provided
    if let Some(role_str) = &request.role {
        let role = role_str
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid role: {}", role_str)))?;
        state.db.update_user_role(id, role).await?;
    }

    // Update password if provided
    if let Some(password) = &request.password {
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        state.db.update_user_password(id, &password_hash).await?;
    }

    // Fetch updated user
    let user = state
        .db
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User: {}", id)))?;

    info!("Updated user: {}", user.email);

    Ok(Json(user.into()))
}

/// DELETE /api/v1/users/{id} (Admin only)
///
/// An account cannot be removed by itself; another admin has to do it.
async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if admin.id == id {
        return Err(ApiError::Forbidden);
    }

    debug!("Deleting user: {}", id);

    let deleted = state.db.delete_user(id).await?;

    if deleted {
        info!("Deleted user: {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("User: {}", id)))
    }
}

/// PUT /api/v1/users/me/profile
async fn update_profile(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(name) = &request.display_name {
        validate_display_name(name)?;
    }

    state
        .db
        .update_user_profile(
            user.id,
            request.display_name.as_deref(),
            request.bio.as_deref(),
        )
        .await?;

    let user = state
        .db
        .get_user_by_id(user.id)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(user.into()))
}

/// Create user routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users", get(list_users))
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/users/me/profile", put(update_profile))
        .route("/api/v1/users/{id}", get(get_user))
        .route("/api/v1/users/{id}", put(update_user))
        .route("/api/v1/users/{id}", delete(delete_user))
}
