//! In-memory record store
//!
//! Each entity has its own lock, so transactions on different entities
//! never wait on each other. Committed records live in a separate snapshot
//! map that unlocked reads serve from.
//!
//! ## Limitations
//!
//! - **NOT durable**: all state is lost when the process exits
//! - **Single-process only**: locks are not shared across processes

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use dqp_common::models::EntityRecord;
use dqp_common::{Error, Result};

use super::entity_locks::{EntityLockGuard, EntityLocks};
use super::{RecordStore, RecordTransaction};

type Committed = Arc<RwLock<HashMap<String, EntityRecord>>>;

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Internal("record store lock poisoned".to_string())
}

/// In-memory store for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    locks: Arc<EntityLocks>,
    committed: Committed,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities with committed records
    pub fn len(&self) -> Result<usize> {
        Ok(self.committed.read().map_err(poison_err)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of entities with a transaction in flight or waiting
    pub fn locked_entities(&self) -> Result<usize> {
        self.locks.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self, entity_id: &str, lock_wait: Duration) -> Result<Box<dyn RecordTransaction>> {
        let guard = self.locks.acquire(entity_id, lock_wait).await?;

        let record = self
            .committed
            .read()
            .map_err(poison_err)?
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| EntityRecord::new(entity_id));

        Ok(Box::new(MemoryTransaction {
            _guard: guard,
            committed: Arc::clone(&self.committed),
            record,
            staged: None,
        }))
    }

    async fn read(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        Ok(self
            .committed
            .read()
            .map_err(poison_err)?
            .get(entity_id)
            .cloned())
    }
}

struct MemoryTransaction {
    _guard: EntityLockGuard,
    committed: Committed,
    record: EntityRecord,
    staged: Option<EntityRecord>,
}

#[async_trait]
impl RecordTransaction for MemoryTransaction {
    fn record(&self) -> &EntityRecord {
        &self.record
    }

    fn write(&mut self, record: EntityRecord) {
        self.staged = Some(record);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if let Some(record) = self.staged {
            self.committed
                .write()
                .map_err(poison_err)?
                .insert(record.entity_id.clone(), record);
        }
        // lock released when the guard drops here
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = InMemoryRecordStore::new();
        {
            let mut tx = store.begin("patient-1", WAIT).await.unwrap();
            tx.write(EntityRecord::new("patient-1"));
        }

        assert!(store.read("patient-1").await.unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_commit_is_visible_to_next_transaction() {
        let store = InMemoryRecordStore::new();
        let mut record = EntityRecord::new("patient-1");
        record.progress.metadata.request_id = Some("req-1".to_string());

        let mut tx = store.begin("patient-1", WAIT).await.unwrap();
        tx.write(record.clone());
        tx.commit().await.unwrap();

        let tx = store.begin("patient-1", WAIT).await.unwrap();
        assert_eq!(tx.record(), &record);
    }

    #[tokio::test]
    async fn test_same_entity_waits_for_lock() {
        let store = Arc::new(InMemoryRecordStore::new());
        let first = store.begin("patient-1", WAIT).await.unwrap();

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.begin("patient-1", WAIT).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished(), "second transaction must wait");

        drop(first);
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_lock_wait_is_bounded() {
        let store = InMemoryRecordStore::new();
        let _first = store.begin("patient-1", WAIT).await.unwrap();

        let err = store
            .begin("patient-1", Duration::from_millis(30))
            .await
            .err()
            .expect("lock is held");

        assert!(err.is_lock_contention());
    }

    #[tokio::test]
    async fn test_finished_transactions_release_their_lock_entry() {
        let store = InMemoryRecordStore::new();

        for i in 0..50 {
            let entity_id = format!("patient-{i}");
            let mut tx = store.begin(&entity_id, WAIT).await.unwrap();
            tx.write(EntityRecord::new(&entity_id));
            tx.commit().await.unwrap();
        }
        {
            let _abandoned = store.begin("patient-x", WAIT).await.unwrap();
            assert_eq!(store.locked_entities().unwrap(), 1);
        }

        assert_eq!(store.locked_entities().unwrap(), 0);
        assert_eq!(store.len().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_different_entities_do_not_block() {
        let store = InMemoryRecordStore::new();
        let _first = store.begin("patient-1", WAIT).await.unwrap();

        let second = tokio::time::timeout(Duration::from_millis(200), store.begin("patient-2", WAIT)).await;
        assert!(second.is_ok(), "other entity must not wait on patient-1");
    }
}
