//! User operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{NewUser, User, UserRole};
use crate::repository::Database;

impl Database {
    // ==================== User Operations ====================

    /// Insert a new user
    ///
    /// The existence check and the insert run in one transaction; the
    /// UNIQUE constraint on email is the final backstop against a
    /// concurrent registration that slips past the check.
    pub async fn insert_user(&self, user: NewUser) -> Result<User, DbError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(&user.email)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(DbError::Duplicate(format!(
                "User '{}' already exists",
                user.email
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, display_name, role, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DbError::Duplicate(format!("User '{}' already exists", user.email))
            }
            _ => DbError::from(e),
        })?;

        tx.commit().await?;

        let id: i64 = result.get("id");

        Ok(User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            display_name: user.display_name,
            bio: None,
            role: user.role,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        })
    }

    /// Get a user by email (expects the caller to have normalized case)
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, email, password_hash, display_name, bio, role, created_at, updated_at, last_login_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        result
            .map(|row| User::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// Get a user by ID
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, email, password_hash, display_name, bio, role, created_at, updated_at, last_login_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        result
            .map(|row| User::try_from(&row).map_err(DbError::from))
            .transpose()
    }

    /// List all users
    pub async fn list_users(&self) -> Result<Vec<User>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, password_hash, display_name, bio, role, created_at, updated_at, last_login_at
            FROM users
            ORDER BY email
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| User::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Update user role
    pub async fn update_user_role(&self, id: i64, role: UserRole) -> Result<bool, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET role = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(role.as_str())
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update user password
    pub async fn update_user_password(
        &self,
        id: i64,
        password_hash: &str,
    ) -> Result<bool, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update profile fields; fields left as None keep their value
    pub async fn update_user_profile(
        &self,
        id: i64,
        display_name: Option<&str>,
        bio: Option<&str>,
    ) -> Result<bool, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = COALESCE(?, display_name),
                bio = COALESCE(?, bio),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(display_name)
        .bind(bio)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful login
    pub async fn update_user_last_login(&self, id: i64) -> Result<bool, DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_login_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user
    pub async fn delete_user(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Check if any users exist
    pub async fn has_users(&self) -> Result<bool, DbError> {
        let result = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = result.get("count");
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            display_name: "Test User".to_string(),
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_user() {
        let (db, _dir) = testing::database().await;

        let user = db.insert_user(new_user("alice@example.com")).await.unwrap();
        assert_eq!(user.role, UserRole::User);
        assert!(user.last_login_at.is_none());

        let by_email = db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);

        let by_id = db.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (db, _dir) = testing::database().await;

        db.insert_user(new_user("alice@example.com")).await.unwrap();
        let result = db.insert_user(new_user("alice@example.com")).await;
        assert!(matches!(result, Err(DbError::Duplicate(_))));

        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_role_and_profile_updates() {
        let (db, _dir) = testing::database().await;
        let user = db.insert_user(new_user("alice@example.com")).await.unwrap();

        assert!(db.update_user_role(user.id, UserRole::Admin).await.unwrap());
        assert!(db
            .update_user_profile(user.id, Some("Alice"), None)
            .await
            .unwrap());
        assert!(db.update_user_last_login(user.id).await.unwrap());

        let updated = db.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(updated.role, UserRole::Admin);
        assert_eq!(updated.display_name, "Alice");
        assert!(updated.last_login_at.is_some());
        // Untouched field survives a partial update
        assert!(updated.bio.is_none());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (db, _dir) = testing::database().await;
        let user = db.insert_user(new_user("alice@example.com")).await.unwrap();

        assert!(db.delete_user(user.id).await.unwrap());
        assert!(!db.delete_user(user.id).await.unwrap());
        assert!(db.get_user_by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_has_users() {
        let (db, _dir) = testing::database().await;
        assert!(!db.has_users().await.unwrap());

        db.insert_user(new_user("alice@example.com")).await.unwrap();
        assert!(db.has_users().await.unwrap());
    }
}
