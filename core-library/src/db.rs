//! # Database Connection Pool Module
//!
//! SQLite pool construction for the local asset catalog.
//!
//! ## Features
//!
//! - **WAL Mode**: enabled for better concurrency (multiple readers, one writer)
//! - **Foreign Keys**: enforced for referential integrity
//! - **Inline Schema**: tables are created on initialization
//!
//! ## Testing
//!
//! For tests, use an in-memory database:
//!
//! ```rust,ignore
//! let pool = create_test_pool().await?;
//! ```

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Create a connection pool for the asset catalog at the given file path.
///
/// The parent directory must already exist; the database file is created on
/// first use. The schema is initialized before the pool is returned.
pub async fn create_pool(database_path: &Path) -> Result<SqlitePool> {
    let url = format!(
        "sqlite://{}",
        database_path.to_string_lossy().replace('\\', "/")
    );

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    debug!(path = ?database_path, "Initialized asset catalog");

    Ok(pool)
}

/// Create an in-memory pool for tests.
pub async fn create_test_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS local_items (
            id TEXT PRIMARY KEY,
            server_id TEXT NOT NULL,
            item_json TEXT NOT NULL,
            user_ids_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_local_items_server ON local_items(server_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_files (
            item_id TEXT NOT NULL,
            name TEXT NOT NULL,
            file_type TEXT NOT NULL,
            image_type TEXT,
            stream_index INTEGER,
            path TEXT NOT NULL,
            PRIMARY KEY (item_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_actions (
            id TEXT PRIMARY KEY,
            server_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            date TEXT NOT NULL,
            position_ticks INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_user_actions_server ON user_actions(server_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS offline_users (
            id TEXT PRIMARY KEY,
            server_id TEXT NOT NULL,
            name TEXT NOT NULL,
            primary_image_tag TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_images (
            user_id TEXT PRIMARY KEY,
            path TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
