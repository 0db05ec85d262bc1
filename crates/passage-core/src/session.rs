//! Session manager implementation
//!
//! Login, refresh rotation, logout and cleanup. Each refresh-token row is
//! addressed by its unique token string, so concurrent sessions for one
//! user never contend; rotation is the only multi-statement atomic unit
//! and lives in the database layer.

use chrono::Utc;
use passage_auth::{hash_password, verify_password, AuthError, JwtManager, TokenKind};
use passage_db::{Database, DbError, NewRefreshToken, NewUser, User, UserRole};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Device label recorded when the client does not supply one
const DEFAULT_DEVICE_LABEL: &str = "Unknown Device";

/// Valid Argon2 hash that always fails verification; verified in place of
/// a real hash when the user does not exist so both outcomes take the
/// same time.
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dGltaW5nX2F0dGFja19wcmV2ZW50aW9u$K8rI5T7VdQ8xkO0GqK5K2w";

/// Lowercase, trimmed form under which every email is stored and looked up
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Token pair handed back to the transport layer after login or refresh
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

/// Session manager for login, rotation and revocation
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtManager>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(db: Database, jwt: Arc<JwtManager>) -> Self {
        info!(
            "Initializing session manager (access ttl: {}s, refresh ttl: {}s)",
            jwt.ttl(TokenKind::Access).num_seconds(),
            jwt.ttl(TokenKind::Refresh).num_seconds()
        );

        Self { db, jwt }
    }

    /// Register a new account with the default role
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, CoreError> {
        let email = normalize_email(email);
        let password_hash = hash_password(password)?;

        let user = self
            .db
            .insert_user(NewUser {
                email,
                password_hash,
                display_name: display_name.to_string(),
                role: UserRole::User,
            })
            .await
            .map_err(|e| match e {
                DbError::Duplicate(msg) => CoreError::Conflict(msg),
                other => CoreError::Database(other),
            })?;

        info!("Registered user: {}", user.email);
        Ok(user)
    }

    /// Verify credentials and open a new session
    ///
    /// A missing user and a wrong password are indistinguishable to the
    /// caller, and both paths perform one hash verification.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_label: Option<String>,
    ) -> Result<SessionTokens, CoreError> {
        let email = normalize_email(email);
        debug!("Login attempt for: {}", email);

        let user_result = self.db.get_user_by_email(&email).await?;

        let (hash_to_verify, user) = match user_result {
            Some(u) => (u.password_hash.clone(), Some(u)),
            None => (DUMMY_HASH.to_string(), None),
        };

        let password_valid = verify_password(password, &hash_to_verify)?;

        let user = match (user, password_valid) {
            (Some(u), true) => u,
            _ => return Err(CoreError::InvalidCredentials),
        };

        let tokens = self.open_session(&user, device_label).await?;
        self.db.update_user_last_login(user.id).await?;

        info!("User {} logged in", user.email);
        Ok(tokens)
    }

    /// Rotate a presented refresh token and mint a fresh access token
    ///
    /// The exact token string must exist in storage; signature validity
    /// alone is never sufficient. On any transaction failure the old
    /// token remains valid (rolled back) and the client may retry with it.
    pub async fn refresh(&self, presented: &str) -> Result<SessionTokens, CoreError> {
        self.jwt
            .verify(presented, TokenKind::Refresh)
            .map_err(|e| match e {
                AuthError::TokenExpired => CoreError::RefreshTokenExpired,
                _ => CoreError::InvalidRefreshToken,
            })?;

        let row = self
            .db
            .get_refresh_token_by_value(presented)
            .await?
            .ok_or(CoreError::InvalidRefreshToken)?;

        if row.is_expired() {
            // Cleanup-on-touch: expired rows must not linger
            self.db.delete_refresh_token_by_id(row.id).await?;
            return Err(CoreError::RefreshTokenExpired);
        }

        // Re-fetch the owner so a deleted account cannot keep refreshing
        let user = self
            .db
            .get_user_by_id(row.user_id)
            .await?
            .ok_or(CoreError::InvalidRefreshToken)?;

        let new_refresh = self
            .jwt
            .issue(user.id, &user.email, user.role.as_str(), TokenKind::Refresh)?;
        let expires_at = Utc::now() + self.jwt.ttl(TokenKind::Refresh);

        let rotated = self
            .db
            .rotate_refresh_token(
                row.id,
                NewRefreshToken {
                    token: new_refresh,
                    user_id: user.id,
                    // Label of the original issuance event, not of the
                    // request performing the refresh
                    device_label: row.device_label,
                    expires_at,
                },
            )
            .await
            .map_err(|e| match e {
                DbError::NotFound(_) => CoreError::InvalidRefreshToken,
                DbError::Transaction(msg) => CoreError::Transaction(msg),
                other => CoreError::Database(other),
            })?;

        let access = self
            .jwt
            .issue(user.id, &user.email, user.role.as_str(), TokenKind::Access)?;

        debug!("Rotated refresh token for user: {}", user.email);

        Ok(SessionTokens {
            access_token: access,
            refresh_token: rotated.token,
            expires_in: self.jwt.ttl(TokenKind::Access).num_seconds(),
            user,
        })
    }

    /// Revoke the single session matching this token (idempotent)
    pub async fn logout(&self, user_id: i64, refresh_token: &str) -> Result<u64, CoreError> {
        let deleted = self
            .db
            .delete_refresh_token_for_user(user_id, refresh_token)
            .await?;
        debug!("Logout removed {} token(s) for user {}", deleted, user_id);
        Ok(deleted)
    }

    /// Revoke every session of a user (idempotent)
    pub async fn logout_all(&self, user_id: i64) -> Result<u64, CoreError> {
        let deleted = self.db.delete_all_refresh_tokens_for_user(user_id).await?;
        info!("Revoked {} session(s) for user {}", deleted, user_id);
        Ok(deleted)
    }

    /// Change a user's password after verifying the current one
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), CoreError> {
        let user = self
            .db
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("User: {}", user_id)))?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(CoreError::InvalidCredentials);
        }

        let password_hash = hash_password(new_password)?;
        self.db.update_user_password(user_id, &password_hash).await?;

        info!("Password changed for user: {}", user.email);
        Ok(())
    }

    /// Bulk-delete expired refresh tokens, returning the count removed
    pub async fn cleanup_expired(&self) -> Result<u64, CoreError> {
        let deleted = self.db.delete_expired_refresh_tokens().await?;
        if deleted > 0 {
            info!("Cleaned up {} expired refresh token(s)", deleted);
        }
        Ok(deleted)
    }

    async fn open_session(
        &self,
        user: &User,
        device_label: Option<String>,
    ) -> Result<SessionTokens, CoreError> {
        let access = self
            .jwt
            .issue(user.id, &user.email, user.role.as_str(), TokenKind::Access)?;
        let refresh = self
            .jwt
            .issue(user.id, &user.email, user.role.as_str(), TokenKind::Refresh)?;

        let expires_at = Utc::now() + self.jwt.ttl(TokenKind::Refresh);
        self.db
            .insert_refresh_token(NewRefreshToken {
                token: refresh.clone(),
                user_id: user.id,
                device_label: device_label.unwrap_or_else(|| DEFAULT_DEVICE_LABEL.to_string()),
                expires_at,
            })
            .await?;

        Ok(SessionTokens {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.jwt.ttl(TokenKind::Access).num_seconds(),
            user: user.clone(),
        })
    }
}

/// Spawn a background task that removes expired refresh tokens periodically
///
/// Cleanup failures are logged and never propagate; the next tick retries.
pub fn spawn_cleanup_task(
    sessions: Arc<SessionManager>,
    interval_hours: u64,
) -> tokio::task::JoinHandle<()> {
    use tokio::time::{interval, Duration};

    info!(
        "Starting background token cleanup task (interval: {} hours)",
        interval_hours
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_hours * 3600));

        // Skip the first tick (which fires immediately)
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match sessions.cleanup_expired().await {
                Ok(deleted) => {
                    if deleted > 0 {
                        info!("Scheduled cleanup removed {} expired token(s)", deleted);
                    }
                }
                Err(e) => {
                    warn!("Error during scheduled token cleanup: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use passage_db::RefreshToken;

    async fn setup() -> (SessionManager, Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passage-test.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let db = Database::new(&url).await.unwrap();
        let jwt = Arc::new(JwtManager::new(
            "access-test-secret",
            "15m",
            "refresh-test-secret",
            "7d",
        ));
        (SessionManager::new(db.clone(), jwt), db, dir)
    }

    async fn registered(sessions: &SessionManager) -> User {
        sessions
            .register("alice@example.com", "Secret1!@", "Alice")
            .await
            .unwrap()
    }

    async fn token_row(db: &Database, token: &str) -> Option<RefreshToken> {
        db.get_refresh_token_by_value(token).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_normalizes_email_and_rejects_duplicates() {
        let (sessions, _db, _dir) = setup().await;

        let user = sessions
            .register("  Alice@Example.COM ", "Secret1!@", "Alice")
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, UserRole::User);

        let dup = sessions
            .register("alice@example.com", "Other2!@", "Alice II")
            .await;
        assert!(matches!(dup, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (sessions, _db, _dir) = setup().await;
        registered(&sessions).await;

        let wrong_password = sessions
            .login("alice@example.com", "not-the-password", None)
            .await;
        let unknown_user = sessions.login("bob@example.com", "Secret1!@", None).await;

        assert!(matches!(wrong_password, Err(CoreError::InvalidCredentials)));
        assert!(matches!(unknown_user, Err(CoreError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_persists_session_and_last_login() {
        let (sessions, db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let tokens = sessions
            .login("alice@example.com", "Secret1!@", Some("Phone".to_string()))
            .await
            .unwrap();

        let row = token_row(&db, &tokens.refresh_token).await.unwrap();
        assert_eq!(row.user_id, user.id);
        assert_eq!(row.device_label, "Phone");

        let reloaded = db.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_rotates_exactly_once() {
        let (sessions, db, _dir) = setup().await;
        registered(&sessions).await;

        let initial = sessions
            .login("alice@example.com", "Secret1!@", None)
            .await
            .unwrap();

        let rotated = sessions.refresh(&initial.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, initial.refresh_token);

        // Old token row is gone; presenting it again must fail even though
        // its signature still verifies
        assert!(token_row(&db, &initial.refresh_token).await.is_none());
        let replay = sessions.refresh(&initial.refresh_token).await;
        assert!(matches!(replay, Err(CoreError::InvalidRefreshToken)));

        // The rotated token is itself valid exactly once
        sessions.refresh(&rotated.refresh_token).await.unwrap();
        let replay = sessions.refresh(&rotated.refresh_token).await;
        assert!(matches!(replay, Err(CoreError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_preserves_device_label() {
        let (sessions, db, _dir) = setup().await;
        registered(&sessions).await;

        let initial = sessions
            .login("alice@example.com", "Secret1!@", Some("Tablet".to_string()))
            .await
            .unwrap();
        let rotated = sessions.refresh(&initial.refresh_token).await.unwrap();

        let row = token_row(&db, &rotated.refresh_token).await.unwrap();
        assert_eq!(row.device_label, "Tablet");
    }

    #[tokio::test]
    async fn test_refresh_rejects_garbage_and_unknown_tokens() {
        let (sessions, _db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let garbage = sessions.refresh("not-a-jwt").await;
        assert!(matches!(garbage, Err(CoreError::InvalidRefreshToken)));

        // Signature-valid but never persisted
        let jwt = JwtManager::new("access-test-secret", "15m", "refresh-test-secret", "7d");
        let minted = jwt
            .issue(user.id, &user.email, "user", TokenKind::Refresh)
            .unwrap();
        let unknown = sessions.refresh(&minted).await;
        assert!(matches!(unknown, Err(CoreError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_expired_row_is_deleted_on_touch() {
        let (sessions, db, _dir) = setup().await;
        let user = registered(&sessions).await;

        // JWT-valid token whose row expiry is already past
        let jwt = JwtManager::new("access-test-secret", "15m", "refresh-test-secret", "7d");
        let token = jwt
            .issue(user.id, &user.email, "user", TokenKind::Refresh)
            .unwrap();
        db.insert_refresh_token(NewRefreshToken {
            token: token.clone(),
            user_id: user.id,
            device_label: "Stale".to_string(),
            expires_at: Utc::now() - Duration::hours(1),
        })
        .await
        .unwrap();

        let result = sessions.refresh(&token).await;
        assert!(matches!(result, Err(CoreError::RefreshTokenExpired)));
        assert!(token_row(&db, &token).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_fails_after_owner_deleted() {
        let (sessions, db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let tokens = sessions
            .login("alice@example.com", "Secret1!@", None)
            .await
            .unwrap();

        // Row goes with the user (cascade), so the lookup itself misses
        db.delete_user(user.id).await.unwrap();
        let result = sessions.refresh(&tokens.refresh_token).await;
        assert!(matches!(
            result,
            Err(CoreError::InvalidRefreshToken | CoreError::RefreshTokenExpired)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_single_session() {
        let (sessions, _db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let phone = sessions
            .login("alice@example.com", "Secret1!@", Some("Phone".to_string()))
            .await
            .unwrap();
        let laptop = sessions
            .login("alice@example.com", "Secret1!@", Some("Laptop".to_string()))
            .await
            .unwrap();

        assert_eq!(
            sessions.logout(user.id, &phone.refresh_token).await.unwrap(),
            1
        );
        // Idempotent
        assert_eq!(
            sessions.logout(user.id, &phone.refresh_token).await.unwrap(),
            0
        );

        let phone_refresh = sessions.refresh(&phone.refresh_token).await;
        assert!(matches!(phone_refresh, Err(CoreError::InvalidRefreshToken)));

        // The other session survives
        sessions.refresh(&laptop.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_all_revokes_everything() {
        let (sessions, _db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let a = sessions
            .login("alice@example.com", "Secret1!@", Some("A".to_string()))
            .await
            .unwrap();
        let b = sessions
            .login("alice@example.com", "Secret1!@", Some("B".to_string()))
            .await
            .unwrap();

        assert_eq!(sessions.logout_all(user.id).await.unwrap(), 2);
        assert_eq!(sessions.logout_all(user.id).await.unwrap(), 0);

        for token in [&a.refresh_token, &b.refresh_token] {
            let result = sessions.refresh(token).await;
            assert!(matches!(result, Err(CoreError::InvalidRefreshToken)));
        }
    }

    #[tokio::test]
    async fn test_cleanup_counts_only_expired_rows() {
        let (sessions, db, _dir) = setup().await;
        let user = registered(&sessions).await;

        for (token, hours) in [("tok-past-1", -1), ("tok-past-2", -48), ("tok-future", 24)] {
            db.insert_refresh_token(NewRefreshToken {
                token: token.to_string(),
                user_id: user.id,
                device_label: "Test".to_string(),
                expires_at: Utc::now() + Duration::hours(hours),
            })
            .await
            .unwrap();
        }

        assert_eq!(sessions.cleanup_expired().await.unwrap(), 2);
        assert_eq!(sessions.cleanup_expired().await.unwrap(), 0);
        assert!(token_row(&db, "tok-future").await.is_some());
    }

    #[tokio::test]
    async fn test_change_password() {
        let (sessions, _db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let wrong = sessions
            .change_password(user.id, "not-the-password", "NewSecret2!@")
            .await;
        assert!(matches!(wrong, Err(CoreError::InvalidCredentials)));

        sessions
            .change_password(user.id, "Secret1!@", "NewSecret2!@")
            .await
            .unwrap();

        let old = sessions.login("alice@example.com", "Secret1!@", None).await;
        assert!(matches!(old, Err(CoreError::InvalidCredentials)));
        sessions
            .login("alice@example.com", "NewSecret2!@", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let (sessions, _db, _dir) = setup().await;
        let user = registered(&sessions).await;

        let login = sessions
            .login("alice@example.com", "Secret1!@", None)
            .await
            .unwrap();

        let rotated = sessions.refresh(&login.refresh_token).await.unwrap();
        assert!(matches!(
            sessions.refresh(&login.refresh_token).await,
            Err(CoreError::InvalidRefreshToken)
        ));

        sessions.logout_all(user.id).await.unwrap();
        assert!(matches!(
            sessions.refresh(&rotated.refresh_token).await,
            Err(CoreError::InvalidRefreshToken)
        ));
    }
}
