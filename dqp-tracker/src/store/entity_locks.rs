//! Per-entity exclusive locks
//!
//! One async mutex per entity id, created on first use and evicted when the
//! last holder or waiter lets go, so the registry only ever holds entities
//! with a transaction in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use dqp_common::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Internal("entity lock registry poisoned".to_string())
}

/// Registry of entity locks
#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities currently locked or waited on
    pub fn len(&self) -> Result<usize> {
        Ok(self.locks.lock().map_err(poison_err)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Take the entity's lock, waiting at most `wait`
    ///
    /// A free lock is taken even when `wait` is zero. Returns
    /// [`Error::Locked`] when the lock is still held after `wait`.
    pub async fn acquire(self: &Arc<Self>, entity_id: &str, wait: Duration) -> Result<EntityLockGuard> {
        let mutex = {
            let mut locks = self.locks.lock().map_err(poison_err)?;
            Arc::clone(
                locks
                    .entry(entity_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        let acquired = tokio::time::timeout(wait, Arc::clone(&mutex).lock_owned()).await;
        drop(mutex);

        match acquired {
            Ok(guard) => Ok(EntityLockGuard {
                guard: Some(guard),
                registry: Arc::clone(self),
                entity_id: entity_id.to_string(),
            }),
            Err(_) => {
                self.evict_if_unused(entity_id);
                Err(Error::Locked(format!(
                    "{} (waited {} ms)",
                    entity_id,
                    wait.as_millis()
                )))
            }
        }
    }

    /// Drop the entity's entry if nobody holds or waits on it
    ///
    /// Clones are only handed out under the registry lock, so a count of one
    /// (the registry's own) cannot grow while it is held.
    fn evict_if_unused(&self, entity_id: &str) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if locks
            .get(entity_id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(entity_id);
        }
    }
}

/// Exclusive hold on one entity, released on drop
#[derive(Debug)]
pub struct EntityLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<EntityLocks>,
    entity_id: String,
}

impl EntityLockGuard {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl Drop for EntityLockGuard {
    fn drop(&mut self) {
        // the guard keeps the mutex alive; release it before counting
        drop(self.guard.take());
        self.registry.evict_if_unused(&self.entity_id);
    }
}
