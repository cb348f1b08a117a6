//! Transactional record store
//!
//! The tracker never holds entity state outside a transaction. A
//! [`RecordTransaction`] owns the entity's exclusive lock from `begin` until
//! it is committed or dropped; dropping it without committing discards every
//! staged write.
//!
//! Both implementations lock per entity through [`EntityLocks`], so a
//! transaction held on one entity never delays another:
//! - [`sqlite::SqliteRecordStore`]: durable, SQLite-backed. SQLite still has a
//!   single writer per database, so the short commit writes of different
//!   entities queue behind each other.
//! - [`memory::InMemoryRecordStore`]: no durability. For tests and embedding.

pub mod entity_locks;
pub mod memory;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;

use dqp_common::models::EntityRecord;
use dqp_common::Result;

pub use entity_locks::{EntityLockGuard, EntityLocks};
pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Keyed store of entity records with exclusive per-entity transactions
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Open a transaction holding the entity's exclusive lock
    ///
    /// Waits at most `lock_wait` for the lock, then fails with an error for
    /// which `is_lock_contention` holds. The returned transaction exposes the
    /// record as stored at lock time (an empty record for an entity never
    /// written before).
    async fn begin(&self, entity_id: &str, lock_wait: Duration)
        -> Result<Box<dyn RecordTransaction>>;

    /// Read the last committed record without locking
    async fn read(&self, entity_id: &str) -> Result<Option<EntityRecord>>;
}

/// An open, locked transaction on one entity record
#[async_trait]
pub trait RecordTransaction: Send {
    /// The record as read under the lock
    fn record(&self) -> &EntityRecord;

    /// Stage the record to be persisted on commit
    fn write(&mut self, record: EntityRecord);

    /// Persist the staged record and release the lock
    async fn commit(self: Box<Self>) -> Result<()>;
}
