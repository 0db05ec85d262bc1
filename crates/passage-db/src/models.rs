//! Database models

use crate::utils::parse_datetime_or_now;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::fmt;
use std::str::FromStr;

/// Error type for parsing models from strings
#[derive(Debug, Clone)]
pub enum ParseError {
    InvalidUserRole(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidUserRole(s) => write!(f, "Invalid user role: {}", s),
        }
    }
}

impl std::error::Error for ParseError {}

/// User role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl FromStr for UserRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            _ => Err(ParseError::InvalidUserRole(s.to_string())),
        }
    }
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// New user (for insertion)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
}

/// Refresh token record
///
/// A token string is valid only while a matching, unexpired row exists.
/// Deleting the row revokes the token regardless of its JWT signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub device_label: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// New refresh token (for insertion)
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token: String,
    pub user_id: i64,
    pub device_label: String,
    pub expires_at: DateTime<Utc>,
}

// ==================== TryFrom Implementations ====================

impl TryFrom<&sqlx::sqlite::SqliteRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        let role_str: String = row.try_get("role")?;
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            display_name: row.try_get("display_name")?,
            bio: row.try_get("bio")?,
            role: UserRole::from_str(&role_str).unwrap_or(UserRole::User),
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
            updated_at: parse_datetime_or_now(&row.try_get::<String, _>("updated_at")?),
            last_login_at: row
                .try_get::<Option<String>, _>("last_login_at")?
                .map(|s| parse_datetime_or_now(&s)),
        })
    }
}

impl TryFrom<&sqlx::sqlite::SqliteRow> for RefreshToken {
    type Error = sqlx::Error;

    fn try_from(row: &sqlx::sqlite::SqliteRow) -> Result<Self, Self::Error> {
        Ok(RefreshToken {
            id: row.try_get("id")?,
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            device_label: row.try_get("device_label")?,
            expires_at: parse_datetime_or_now(&row.try_get::<String, _>("expires_at")?),
            created_at: parse_datetime_or_now(&row.try_get::<String, _>("created_at")?),
        })
    }
}
