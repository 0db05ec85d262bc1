//! Dual-token JWT management
//!
//! Access and refresh tokens are signed with distinct secrets and carry
//! distinct lifetimes. Verification of one kind never accepts a token of
//! the other kind.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::AuthError;
use crate::ttl::parse_ttl;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Email address
    pub email: String,
    /// User role
    pub role: String,
    /// Token identifier, unique per mint
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl Claims {
    /// Subject parsed back to a user id
    pub fn user_id(&self) -> i64 {
        self.sub.parse().unwrap_or(0)
    }
}

/// Which of the two token families a string belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

/// JWT manager for token generation and validation
pub struct JwtManager {
    access: TokenKeys,
    refresh: TokenKeys,
}

impl JwtManager {
    /// Create a new JWT manager from secrets and TTL strings ("15m", "7d")
    pub fn new(
        access_secret: &str,
        access_ttl: &str,
        refresh_secret: &str,
        refresh_ttl: &str,
    ) -> Self {
        Self::with_durations(
            access_secret,
            parse_ttl(access_ttl),
            refresh_secret,
            parse_ttl(refresh_ttl),
        )
    }

    fn with_durations(
        access_secret: &str,
        access_ttl: Duration,
        refresh_secret: &str,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: TokenKeys::new(access_secret, access_ttl),
            refresh: TokenKeys::new(refresh_secret, refresh_ttl),
        }
    }

    fn keys(&self, kind: TokenKind) -> &TokenKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime configured for the given token kind
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.keys(kind).ttl
    }

    /// Generate a signed token for a user
    pub fn issue(
        &self,
        user_id: i64,
        email: &str,
        role: &str,
        kind: TokenKind,
    ) -> Result<String, AuthError> {
        let keys = self.keys(kind);
        let now = Utc::now();
        let exp = now + keys.ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        debug!("Issuing {} token for user: {}", kind.as_str(), email);

        encode(&Header::default(), &claims, &keys.encoding).map_err(AuthError::Jwt)
    }

    /// Validate a token of the given kind and return its claims
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let keys = self.keys(kind);
        let validation = Validation::default();

        let token_data =
            decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })?;

        // The default validation allows leeway; enforce expiry strictly
        let now = Utc::now().timestamp();
        if token_data.claims.exp < now {
            return Err(AuthError::TokenExpired);
        }

        Ok(token_data.claims)
    }
}
