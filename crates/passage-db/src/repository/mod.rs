//! Database repository implementation

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbError;

// Submodules
mod refresh_tokens;
mod users;

/// Attempts made when establishing the initial connection
const CONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay between connection attempts
const CONNECT_RETRY_DELAY_SECS: u64 = 2;

/// Database connection and operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        info!("Connecting to database: {}", database_url);

        let pool = SqlitePool::connect(database_url).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Connect with bounded retry and fixed backoff
    ///
    /// Used at startup only. Request-time failures are never retried here;
    /// they surface to the caller.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let mut last_err = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            match Self::new(database_url).await {
                Ok(db) => return Ok(db),
                Err(e) => {
                    warn!(
                        "Database connection attempt {}/{} failed: {}",
                        attempt, CONNECT_ATTEMPTS, e
                    );
                    last_err = Some(e);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_secs(
                            CONNECT_RETRY_DELAY_SECS,
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_err.expect("at least one connection attempt"))
    }

    /// Get the underlying pool for advanced usage
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), DbError> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                display_name TEXT NOT NULL,
                bio TEXT,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_login_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL UNIQUE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                device_label TEXT NOT NULL DEFAULT 'Unknown Device',
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_token ON refresh_tokens(token)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expiry ON refresh_tokens(expires_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Database;

    /// Fresh file-backed database in a temp dir; keep the guard alive
    pub async fn database() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passage-test.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let db = Database::new(&url).await.unwrap();
        (db, dir)
    }
}
