//! SQLite-backed record store
//!
//! The entity lock lives in process ([`EntityLocks`]); SQLite's write lock is
//! only taken for the commit itself, so a transaction held open on one
//! entity never stalls another. Each commit bumps the entity row's
//! `lock_version` and checks it against the version read at `begin`, which
//! turns a write from another process (or another store on the same pool)
//! into [`Error::Conflict`] instead of a lost update.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use dqp_common::models::EntityRecord;
use dqp_common::{Error, Result};

use super::entity_locks::{EntityLockGuard, EntityLocks};
use super::{RecordStore, RecordTransaction};
use crate::db::records;
use crate::utils::begin_monitored;

/// Record store over the `entity_progress`/`source_progress` tables
///
/// Clones share their entity locks.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    locks: Arc<EntityLocks>,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(EntityLocks::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of entities with a transaction in flight or waiting
    pub fn locked_entities(&self) -> Result<usize> {
        self.locks.len()
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn begin(&self, entity_id: &str, lock_wait: Duration) -> Result<Box<dyn RecordTransaction>> {
        let guard = self.locks.acquire(entity_id, lock_wait).await?;

        // version and record from one snapshot
        let mut snapshot = self.pool.begin().await?;
        let lock_version = records::lock_version(&mut *snapshot, entity_id).await?;
        let record = records::load_record(&mut *snapshot, entity_id)
            .await?
            .unwrap_or_else(|| EntityRecord::new(entity_id));
        snapshot.commit().await?;

        tracing::trace!(entity_id, lock_version, "Entity locked");

        Ok(Box::new(SqliteTransaction {
            pool: self.pool.clone(),
            _guard: guard,
            lock_version,
            record,
            staged: None,
        }))
    }

    async fn read(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        let mut conn = self.pool.acquire().await?;
        records::load_record(&mut conn, entity_id).await
    }
}

struct SqliteTransaction {
    pool: SqlitePool,
    _guard: EntityLockGuard,
    /// Row version seen at `begin`; 0 when the row did not exist
    lock_version: i64,
    record: EntityRecord,
    staged: Option<EntityRecord>,
}

#[async_trait]
impl RecordTransaction for SqliteTransaction {
    fn record(&self) -> &EntityRecord {
        &self.record
    }

    fn write(&mut self, record: EntityRecord) {
        self.staged = Some(record);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let SqliteTransaction {
            pool,
            _guard,
            lock_version,
            staged,
            ..
        } = *self;

        let Some(record) = staged else {
            return Ok(());
        };

        let mut tx = begin_monitored(&pool, "sqlite_store::commit").await?;

        // Write first: the database write lock must be held before checking
        let bumped = records::lock_entity(tx.conn()?, &record.entity_id).await?;
        if bumped != lock_version + 1 {
            return Err(Error::Conflict(format!(
                "{} was written elsewhere since it was locked (version {} is now {})",
                record.entity_id,
                lock_version,
                bumped - 1
            )));
        }

        records::save_record(tx.conn()?, &record).await?;
        tx.commit().await
    }
}
