//! Request/Response DTOs for the API

use passage_db::User;
use serde::{Deserialize, Serialize};

// ==================== Auth Types ====================

/// Registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_label: Option<String>,
}

/// Refresh/logout request body; non-cookie clients send the token here
#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Password change request
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Token pair response; the same tokens also travel as cookies
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Sessions-revoked response
#[derive(Serialize)]
pub struct RevokedResponse {
    pub revoked: u64,
}

// ==================== User Types ====================

/// User view (never includes the password hash)
#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_login_at: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            bio: user.bio,
            role: user.role.as_str().to_string(),
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
            last_login_at: user.last_login_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Create user request (admin)
#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub role: String,
}

/// Update user request (admin)
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub password: Option<String>,
}

/// Update own profile request
#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

// ==================== Admin Types ====================

/// Expired-token cleanup response
#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}
