//! Test doubles for the tracker's collaborators

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dqp_common::models::EntityRecord;
use dqp_common::{Error, Result};
use dqp_tracker::{CompletionNotifier, ProgressNotification, RecordStore, RecordTransaction};

/// Notifier that keeps every notification it receives
#[derive(Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<ProgressNotification>>,
}

impl RecordingNotifier {
    pub fn received(&self) -> Vec<ProgressNotification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, notification: &ProgressNotification) -> Result<()> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Notifier whose delivery always fails
#[derive(Default)]
pub struct FailingNotifier {
    pub calls: AtomicU32,
}

#[async_trait]
impl CompletionNotifier for FailingNotifier {
    async fn notify(&self, _notification: &ProgressNotification) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Internal("webhook endpoint unreachable".to_string()))
    }
}

/// Store wrapper whose commits fail, rolling the transaction back
pub struct FailingCommitStore {
    inner: Arc<dyn RecordStore>,
}

impl FailingCommitStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RecordStore for FailingCommitStore {
    async fn begin(&self, entity_id: &str, lock_wait: Duration) -> Result<Box<dyn RecordTransaction>> {
        let inner = self.inner.begin(entity_id, lock_wait).await?;
        Ok(Box::new(FailingCommit { inner }))
    }

    async fn read(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        self.inner.read(entity_id).await
    }
}

struct FailingCommit {
    inner: Box<dyn RecordTransaction>,
}

#[async_trait]
impl RecordTransaction for FailingCommit {
    fn record(&self) -> &EntityRecord {
        self.inner.record()
    }

    fn write(&mut self, record: EntityRecord) {
        self.inner.write(record);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        // inner transaction dropped uncommitted
        Err(Error::Internal("disk full".to_string()))
    }
}

/// Store whose entity lock is never available
#[derive(Default)]
pub struct LockedStore {
    pub attempts: AtomicU32,
}

#[async_trait]
impl RecordStore for LockedStore {
    async fn begin(&self, _entity_id: &str, _lock_wait: Duration) -> Result<Box<dyn RecordTransaction>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Database(sqlx::Error::Protocol(
            "database is locked".to_string(),
        )))
    }

    async fn read(&self, _entity_id: &str) -> Result<Option<EntityRecord>> {
        Ok(None)
    }
}
