//! Settings database operations
//!
//! Key-value accessors for the `settings` table. Values stored here take
//! priority over the TOML bootstrap config.

use sqlx::{Pool, Sqlite};
use dqp_common::{Error, Result};

#[cfg(test)]
use sqlx::SqlitePool;

/// Settings key for the lock acquisition bound
pub const MAX_LOCK_WAIT_KEY: &str = "dqp_max_lock_wait_ms";

/// Get the lock acquisition bound override, if set
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<Option<u64>> {
    get_setting(db, MAX_LOCK_WAIT_KEY).await
}

/// Persist the lock acquisition bound override
pub async fn set_max_lock_wait_ms(db: &Pool<Sqlite>, max_wait_ms: u64) -> Result<()> {
    set_setting(db, MAX_LOCK_WAIT_KEY, max_wait_ms).await
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT value FROM settings WHERE key = ?"
    )
    .bind(key)
    .fetch_optional(db)
    .await
    .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value.trim().parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (internal)
async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value"
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Single-connection in-memory database with the settings table
    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_max_lock_wait_not_set() {
        let pool = setup_test_db().await;
        assert_eq!(get_max_lock_wait_ms(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_max_lock_wait_upsert() {
        let pool = setup_test_db().await;

        set_max_lock_wait_ms(&pool, 250).await.unwrap();
        set_max_lock_wait_ms(&pool, 750).await.unwrap();

        assert_eq!(get_max_lock_wait_ms(&pool).await.unwrap(), Some(750));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = ?")
            .bind(MAX_LOCK_WAIT_KEY)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_unparseable_value_is_config_error() {
        let pool = setup_test_db().await;

        sqlx::query("INSERT INTO settings (key, value) VALUES (?, 'soon')")
            .bind(MAX_LOCK_WAIT_KEY)
            .execute(&pool)
            .await
            .unwrap();

        let err = get_max_lock_wait_ms(&pool).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
