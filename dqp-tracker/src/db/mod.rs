//! Database access for dqp-tracker
//!
//! SQLite persistence for entity progress. One row per entity in
//! `entity_progress`, one row per (entity, source) in `source_progress`.

pub mod records;
pub mod settings;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// How long a commit waits on SQLite's database-wide write lock before
/// reporting "database is locked"
///
/// Entity locks are taken in process and bounded by the tracker's lock wait;
/// this only covers other commits (any entity, any process) writing at the
/// same moment.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize database connection pool
///
/// Creates the file (and parent directory) if missing and ensures the
/// progress tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Initialize dqp-tracker tables
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `lock_version` is bumped by every mutating transaction; the bump is
    // what takes the write lock before the record is read
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_progress (
            entity_id TEXT PRIMARY KEY,
            progress TEXT NOT NULL DEFAULT '{}',
            lock_version INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_progress (
            entity_id TEXT NOT NULL REFERENCES entity_progress(entity_id) ON DELETE CASCADE,
            source TEXT NOT NULL,
            progress TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (entity_id, source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, entity_progress, source_progress)");

    Ok(())
}
