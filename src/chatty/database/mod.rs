use sqlx::{
    Sqlite, SqlitePool,
    migrate::{MigrateDatabase, Migrator},
    sqlite::SqlitePoolOptions,
};
use std::{path::PathBuf, sync::LazyLock, time::Duration};
use thiserror::Error;

pub mod groups;
pub mod messages;
pub mod summary_cache;
pub mod users;
pub mod utils;
pub mod visibility;

pub static MIGRATOR: LazyLock<Migrator> = LazyLock::new(|| sqlx::migrate!("./db_migrations"));

const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),
    #[error("Invalid timestamp: {timestamp} cannot be converted to DateTime")]
    InvalidTimestamp { timestamp: i64 },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct Database {
    pub pool: SqlitePool,
    pub path: PathBuf,
}

impl Database {
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}", db_path.display());

        tracing::debug!("Checking if DB exists...{:?}", db_url);
        match Sqlite::database_exists(&db_url).await {
            Ok(true) => {
                tracing::debug!("DB exists");
            }
            Ok(false) => {
                tracing::debug!("DB does not exist, creating...");
                Sqlite::create_database(&db_url).await.map_err(|e| {
                    tracing::error!("Error creating DB: {:?}", e);
                    DatabaseError::Sqlx(e)
                })?;
            }
            Err(e) => {
                tracing::warn!(
                    "Could not check if database exists: {:?}, attempting to create",
                    e
                );
                Sqlite::create_database(&db_url).await.map_err(|e| {
                    tracing::error!("Error creating DB: {:?}", e);
                    DatabaseError::Sqlx(e)
                })?;
            }
        }

        let pool = Self::create_connection_pool(&db_url).await?;

        // Automatically run migrations
        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            path: db_path,
        })
    }

    /// Creates and configures a SQLite connection pool
    async fn create_connection_pool(db_url: &str) -> Result<SqlitePool, DatabaseError> {
        tracing::debug!("Creating connection pool...");
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
            .max_connections(DB_MAX_CONNECTIONS)
            .after_connect(|conn, _| {
                Box::pin(async move {
                    let conn = &mut *conn;
                    // Enable WAL mode for better concurrent access
                    sqlx::query("PRAGMA journal_mode=WAL")
                        .execute(&mut *conn)
                        .await?;
                    // Set busy timeout for lock contention
                    sqlx::query(&format!("PRAGMA busy_timeout={DB_BUSY_TIMEOUT_MS}"))
                        .execute(&mut *conn)
                        .await?;
                    // Enable foreign keys so group deletes cascade
                    sqlx::query("PRAGMA foreign_keys = ON")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&format!("{db_url}?mode=rwc"))
            .await?;
        Ok(pool)
    }

    /// Runs all pending database migrations
    ///
    /// This method is idempotent - it's safe to call multiple times.
    /// Only new migrations will be applied.
    pub async fn migrate_up(&self) -> Result<(), DatabaseError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Deletes all data by dropping and recreating all tables
    ///
    /// Temporarily disables foreign key constraints, drops every user table
    /// (including migration tracking), then re-runs migrations to recreate
    /// the current schema from scratch.
    pub async fn delete_all_data(&self) -> Result<(), DatabaseError> {
        let mut txn = self.pool.begin().await?;

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *txn)
            .await?;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type='table'
             AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *txn)
        .await?;

        for (table_name,) in tables {
            let drop_query = format!("DROP TABLE IF EXISTS {}", table_name);
            sqlx::query(&drop_query).execute(&mut *txn).await?;
        }

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *txn)
            .await?;

        txn.commit().await?;

        MIGRATOR.run(&self.pool).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path)
            .await
            .expect("Failed to create test database");
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        let db = Database::new(db_path.clone()).await;
        assert!(db.is_ok());
        assert_eq!(db.unwrap().path, db_path);
    }

    #[tokio::test]
    async fn test_database_migrations_applied() {
        let (db, _temp_dir) = create_test_db().await;

        for table in [
            "users",
            "chat_groups",
            "group_members",
            "messages",
            "message_seen",
            "group_visibility",
            "summary_cache",
        ] {
            let result =
                sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                    .bind(table)
                    .fetch_optional(&db.pool)
                    .await
                    .expect("Failed to query sqlite_master");
            assert!(result.is_some(), "table {table} missing");
        }
    }

    #[tokio::test]
    async fn test_database_pragma_settings() {
        let (db, _temp_dir) = create_test_db().await;

        let foreign_keys: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&db.pool)
            .await
            .expect("Failed to check foreign_keys pragma");
        assert_eq!(foreign_keys.0, 1);

        let journal_mode: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&db.pool)
            .await
            .expect("Failed to check journal_mode pragma");
        assert_eq!(journal_mode.0.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_message_conversation_check_constraint() {
        let (db, _temp_dir) = create_test_db().await;

        sqlx::query("INSERT INTO users (display_name, created_at, updated_at) VALUES ('a', 0, 0)")
            .execute(&db.pool)
            .await
            .unwrap();

        // Neither receiver nor group: rejected
        let result =
            sqlx::query("INSERT INTO messages (sender_id, text, created_at) VALUES (1, 'x', 0)")
                .execute(&db.pool)
                .await;
        assert!(result.is_err());

        // Both receiver and group: rejected
        sqlx::query(
            "INSERT INTO chat_groups (name, admin_id, created_at, updated_at) VALUES ('g', 1, 0, 0)",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        let result = sqlx::query(
            "INSERT INTO messages (sender_id, receiver_id, group_id, text, created_at)
             VALUES (1, 1, 1, 'x', 0)",
        )
        .execute(&db.pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_all_data() {
        let (db, _temp_dir) = create_test_db().await;

        sqlx::query("INSERT INTO users (display_name, created_at, updated_at) VALUES ('a', 0, 0)")
            .execute(&db.pool)
            .await
            .expect("Failed to insert test user");

        let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&db.pool)
            .await
            .expect("Failed to count users");
        assert_eq!(user_count.0, 1);

        db.delete_all_data().await.expect("Failed to wipe data");

        let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&db.pool)
            .await
            .expect("Failed to count users after deletion");
        assert_eq!(user_count.0, 0);
    }

    #[tokio::test]
    async fn test_database_reopen_existing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");

        let db1 = Database::new(db_path.clone())
            .await
            .expect("Failed to create database");

        sqlx::query("INSERT INTO users (display_name, created_at, updated_at) VALUES ('a', 0, 0)")
            .execute(&db1.pool)
            .await
            .expect("Failed to insert test user");

        drop(db1);

        let db2 = Database::new(db_path)
            .await
            .expect("Failed to reopen database");

        let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&db2.pool)
            .await
            .expect("Failed to count users");
        assert_eq!(user_count.0, 1);
    }
}
