//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use passage_core::CoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Core error: {0}")]
    Core(#[from] passage_core::CoreError),

    #[error("Database error: {0}")]
    Database(#[from] passage_db::DbError),

    #[error("Auth error: {0}")]
    Auth(#[from] passage_auth::AuthError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal error".to_string(),
            ),
            ApiError::Core(e) => match e {
                // Never reveal which of user-absent / wrong-password happened
                CoreError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Invalid credentials".to_string(),
                ),
                CoreError::InvalidRefreshToken => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_REFRESH_TOKEN",
                    "Invalid refresh token".to_string(),
                ),
                CoreError::RefreshTokenExpired => (
                    StatusCode::UNAUTHORIZED,
                    "REFRESH_TOKEN_EXPIRED",
                    "Refresh token expired".to_string(),
                ),
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
                // Atomicity failures surface as a generic 5xx; the caller
                // retries with its original (rolled-back) token
                CoreError::Transaction(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TRANSACTION_FAILED",
                    "Internal error".to_string(),
                ),
                CoreError::Auth(_) => (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Unauthorized".to_string(),
                ),
                CoreError::Database(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Internal error".to_string(),
                ),
            },
            ApiError::Database(e) => match e {
                passage_db::DbError::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone())
                }
                passage_db::DbError::Duplicate(msg) => {
                    (StatusCode::CONFLICT, "CONFLICT", msg.clone())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Internal error".to_string(),
                ),
            },
            ApiError::Auth(e) => match e {
                passage_auth::AuthError::PasswordHash(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal error".to_string(),
                ),
                _ => (
                    StatusCode::UNAUTHORIZED,
                    "AUTH_ERROR",
                    e.to_string(),
                ),
            },
        };

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
