//! Entity progress record persistence
//!
//! Progress documents are stored as JSON. Every function takes a bare
//! connection so callers decide whether it runs inside a transaction.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::warn;

use dqp_common::models::{EntityProgress, EntityRecord, Source, SourceProgressRecord};
use dqp_common::Result;

/// Take the write lock on an entity row, creating the row if needed
///
/// Must be the first statement of the transaction: SQLite grants the write
/// lock on the first write, and a transaction that reads before writing can
/// lose the upgrade race to another writer.
///
/// Returns the row's lock generation after the bump.
pub async fn lock_entity(conn: &mut SqliteConnection, entity_id: &str) -> Result<i64> {
    let lock_version: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO entity_progress (entity_id, progress, lock_version, updated_at)
        VALUES (?, '{}', 1, ?)
        ON CONFLICT(entity_id) DO UPDATE SET lock_version = lock_version + 1
        RETURNING lock_version
        "#,
    )
    .bind(entity_id)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    Ok(lock_version)
}

/// Current lock generation of an entity row, 0 if it has none
pub async fn lock_version(conn: &mut SqliteConnection, entity_id: &str) -> Result<i64> {
    let lock_version: Option<i64> = sqlx::query_scalar(
        "SELECT lock_version FROM entity_progress WHERE entity_id = ?",
    )
    .bind(entity_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(lock_version.unwrap_or(0))
}

/// Load the entity aggregate and every source record
///
/// Returns `None` if the entity has never been written.
pub async fn load_record(conn: &mut SqliteConnection, entity_id: &str) -> Result<Option<EntityRecord>> {
    let progress_json: Option<String> = sqlx::query_scalar(
        "SELECT progress FROM entity_progress WHERE entity_id = ?",
    )
    .bind(entity_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(progress_json) = progress_json else {
        return Ok(None);
    };

    let progress: EntityProgress = serde_json::from_str(&progress_json)?;
    let mut record = EntityRecord {
        entity_id: entity_id.to_string(),
        progress,
        sources: Default::default(),
    };

    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT source, progress FROM source_progress WHERE entity_id = ?",
    )
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;

    for (source_name, source_json) in rows {
        let source: Source = match source_name.parse() {
            Ok(source) => source,
            Err(e) => {
                warn!(entity_id, source = %source_name, "Skipping unrecognized source row: {}", e);
                continue;
            }
        };
        let source_progress: SourceProgressRecord = serde_json::from_str(&source_json)?;
        record.sources.insert(source, source_progress);
    }

    Ok(Some(record))
}

/// Persist the aggregate and the entity's source rows
///
/// A known source missing from `record` has its row removed. Rows of
/// sources this build does not recognize are left untouched.
pub async fn save_record(conn: &mut SqliteConnection, record: &EntityRecord) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let progress_json = serde_json::to_string(&record.progress)?;

    sqlx::query(
        r#"
        INSERT INTO entity_progress (entity_id, progress, lock_version, updated_at)
        VALUES (?, ?, 0, ?)
        ON CONFLICT(entity_id) DO UPDATE SET
            progress = excluded.progress,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.entity_id)
    .bind(&progress_json)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    for source in Source::ALL {
        let Some(source_progress) = record.sources.get(&source) else {
            sqlx::query("DELETE FROM source_progress WHERE entity_id = ? AND source = ?")
                .bind(&record.entity_id)
                .bind(source.as_str())
                .execute(&mut *conn)
                .await?;
            continue;
        };

        let source_json = serde_json::to_string(source_progress)?;
        sqlx::query(
            r#"
            INSERT INTO source_progress (entity_id, source, progress, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(entity_id, source) DO UPDATE SET
                progress = excluded.progress,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.entity_id)
        .bind(source.as_str())
        .bind(&source_json)
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
