//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// User absent or password mismatch; the two are indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Database error: {0}")]
    Database(#[from] passage_db::DbError),

    #[error("Auth error: {0}")]
    Auth(#[from] passage_auth::AuthError),
}
