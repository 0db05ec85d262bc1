//! Refresh token operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{NewRefreshToken, RefreshToken};
use crate::repository::Database;

impl Database {
    // ==================== Refresh Token Operations ====================

    /// Insert a new refresh token row
    pub async fn insert_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshToken, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, device_label, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(&token.device_label)
        .bind(token.expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = result.get("id");

        Ok(RefreshToken {
            id,
            token: token.token,
            user_id: token.user_id,
            device_label: token.device_label,
            expires_at: token.expires_at,
            created_at: now,
        })
    }

    /// Look up a refresh token by its exact string value
    pub async fn get_refresh_token_by_value(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, token, user_id, device_label, expires_at, created_at
            FROM refresh_tokens
            WHERE token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        result
            .map(|row| RefreshToken::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// Delete a refresh token row by id
    pub async fn delete_refresh_token_by_id(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the row matching a user and exact token value (idempotent)
    pub async fn delete_refresh_token_for_user(
        &self,
        user_id: i64,
        token: &str,
    ) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ? AND token = ?")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every refresh token owned by a user (idempotent)
    pub async fn delete_all_refresh_tokens_for_user(&self, user_id: i64) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Bulk-delete rows whose expiry is in the past, returning the count
    ///
    /// Only ever touches rows no concurrent login/refresh can be relying
    /// on as valid, so it needs no coordination with them.
    pub async fn delete_expired_refresh_tokens(&self) -> Result<u64, DbError> {
        let now = Utc::now();
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Atomically replace a refresh token row with its successor
    ///
    /// Delete and insert run in one transaction. The delete must affect
    /// exactly one row; zero rows means another call already rotated this
    /// token, and the transaction rolls back with NotFound so the caller
    /// can reject the presented token.
    pub async fn rotate_refresh_token(
        &self,
        old_id: i64,
        new: NewRefreshToken,
    ) -> Result<RefreshToken, DbError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Refresh token: {}", old_id)));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, user_id, device_label, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new.token)
        .bind(new.user_id)
        .bind(&new.device_label)
        .bind(new.expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DbError::Transaction(format!("rotation insert failed: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(format!("rotation commit failed: {}", e)))?;

        let id: i64 = result.get("id");

        Ok(RefreshToken {
            id,
            token: new.token,
            user_id: new.user_id,
            device_label: new.device_label,
            expires_at: new.expires_at,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, UserRole};
    use crate::repository::testing;
    use chrono::Duration;

    async fn seeded_user(db: &Database) -> i64 {
        db.insert_user(NewUser {
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            display_name: "Alice".to_string(),
            role: UserRole::User,
        })
        .await
        .unwrap()
        .id
    }

    fn token_row(user_id: i64, token: &str, ttl: Duration) -> NewRefreshToken {
        NewRefreshToken {
            token: token.to_string(),
            user_id,
            device_label: "Unknown Device".to_string(),
            expires_at: Utc::now() + ttl,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (db, _dir) = testing::database().await;
        let user_id = seeded_user(&db).await;

        let row = db
            .insert_refresh_token(token_row(user_id, "tok-1", Duration::days(7)))
            .await
            .unwrap();
        assert_eq!(row.user_id, user_id);
        assert!(!row.is_expired());

        let found = db
            .get_refresh_token_by_value("tok-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, row.id);
        assert_eq!(found.device_label, "Unknown Device");

        assert!(db
            .get_refresh_token_by_value("tok-unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rotation_replaces_exactly_one_row() {
        let (db, _dir) = testing::database().await;
        let user_id = seeded_user(&db).await;

        let old = db
            .insert_refresh_token(token_row(user_id, "tok-old", Duration::days(7)))
            .await
            .unwrap();

        let new = db
            .rotate_refresh_token(old.id, token_row(user_id, "tok-new", Duration::days(7)))
            .await
            .unwrap();

        assert!(db
            .get_refresh_token_by_value("tok-old")
            .await
            .unwrap()
            .is_none());
        assert!(db
            .get_refresh_token_by_value("tok-new")
            .await
            .unwrap()
            .is_some());
        assert_ne!(old.id, new.id);
    }

    #[tokio::test]
    async fn test_rotation_of_missing_row_fails_and_rolls_back() {
        let (db, _dir) = testing::database().await;
        let user_id = seeded_user(&db).await;

        let result = db
            .rotate_refresh_token(9999, token_row(user_id, "tok-new", Duration::days(7)))
            .await;
        assert!(matches!(result, Err(DbError::NotFound(_))));

        // The insert must not have survived the rollback
        assert!(db
            .get_refresh_token_by_value("tok-new")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_second_rotation_of_same_row_loses() {
        let (db, _dir) = testing::database().await;
        let user_id = seeded_user(&db).await;

        let old = db
            .insert_refresh_token(token_row(user_id, "tok-old", Duration::days(7)))
            .await
            .unwrap();

        db.rotate_refresh_token(old.id, token_row(user_id, "tok-a", Duration::days(7)))
            .await
            .unwrap();
        let second = db
            .rotate_refresh_token(old.id, token_row(user_id, "tok-b", Duration::days(7)))
            .await;
        assert!(matches!(second, Err(DbError::NotFound(_))));
        assert!(db
            .get_refresh_token_by_value("tok-b")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_targeted_and_global_revocation() {
        let (db, _dir) = testing::database().await;
        let user_id = seeded_user(&db).await;

        db.insert_refresh_token(token_row(user_id, "tok-1", Duration::days(7)))
            .await
            .unwrap();
        db.insert_refresh_token(token_row(user_id, "tok-2", Duration::days(7)))
            .await
            .unwrap();

        assert_eq!(
            db.delete_refresh_token_for_user(user_id, "tok-1")
                .await
                .unwrap(),
            1
        );
        // Idempotent: deleting again removes nothing
        assert_eq!(
            db.delete_refresh_token_for_user(user_id, "tok-1")
                .await
                .unwrap(),
            0
        );

        assert_eq!(
            db.delete_all_refresh_tokens_for_user(user_id).await.unwrap(),
            1
        );
        assert_eq!(
            db.delete_all_refresh_tokens_for_user(user_id).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_expired_cleanup_counts_only_past_rows() {
        let (db, _dir) = testing::database().await;
        let user_id = seeded_user(&db).await;

        db.insert_refresh_token(token_row(user_id, "tok-past-1", Duration::days(-1)))
            .await
            .unwrap();
        db.insert_refresh_token(token_row(user_id, "tok-past-2", Duration::hours(-2)))
            .await
            .unwrap();
        db.insert_refresh_token(token_row(user_id, "tok-future", Duration::days(7)))
            .await
            .unwrap();

        assert_eq!(db.delete_expired_refresh_tokens().await.unwrap(), 2);
        assert_eq!(db.delete_expired_refresh_tokens().await.unwrap(), 0);
        assert!(db
            .get_refresh_token_by_value("tok-future")
            .await
            .unwrap()
            .is_some());
    }
}
