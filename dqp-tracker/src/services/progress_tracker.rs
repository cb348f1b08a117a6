//! Transactional progress mutator
//!
//! Every mutation runs the same cycle against the [`RecordStore`]:
//!
//! 1. Open a transaction holding the entity lock (waiting and retrying with
//!    backoff for at most `max_lock_wait_ms` in total)
//! 2. Take the record as read under the lock
//! 3. Apply the mutation to the source record(s)
//! 4. Re-aggregate entity progress from every source record
//! 5. Write and commit, releasing the lock
//! 6. Notify the [`CompletionNotifier`]
//!
//! Nothing about an entity is cached between calls. Notification runs after
//! commit, so notifier failures cannot undo progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use dqp_common::models::{
    EntityProgress, EntityRecord, ProgressMetadata, ProgressStatus, QueryProgress, ResetTarget,
    Source, SourceProgressRecord, Stage, StageProgress,
};

use super::aggregation::aggregate;
use super::notifier::{CompletionNotifier, NoopNotifier, ProgressNotification};
use super::source_tracker::{self, ProgressUpdate, TallyDelta};
use crate::error::{TrackerError, TrackerResult};
use crate::store::RecordStore;
use crate::utils::retry_on_lock;

/// Default wait for the entity lock before giving up
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Parameters for starting a new request on an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInit {
    pub request_id: String,
    /// Defaults to now
    pub started_at: Option<DateTime<Utc>>,
    pub trigger_consolidated: Option<bool>,
}

impl RequestInit {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            started_at: None,
            trigger_consolidated: None,
        }
    }

    /// New request with a freshly generated id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_trigger_consolidated(mut self, trigger: bool) -> Self {
        self.trigger_consolidated = Some(trigger);
        self
    }
}

/// Entry point for every progress mutation and read
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn CompletionNotifier>,
    max_lock_wait_ms: u64,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(NoopNotifier),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn max_lock_wait_ms(&self) -> u64 {
        self.max_lock_wait_ms
    }

    /// Overwrite total/status of the stages named in `update` for one source
    ///
    /// Counters are left to [`tally`](Self::tally). An update carrying
    /// nothing returns the current aggregate without locking.
    pub async fn set_progress(
        &self,
        entity_id: &str,
        source: Source,
        update: ProgressUpdate,
    ) -> TrackerResult<EntityProgress> {
        validate_entity_id(entity_id)?;
        validate_request_id(update.metadata.request_id.as_deref())?;

        if update.is_noop() {
            debug!(entity_id, %source, "Empty progress update, nothing to apply");
            return self.get_aggregate(entity_id).await;
        }

        self.mutate("set_progress", entity_id, None, move |record| {
            source_tracker::set_progress(record.source_mut(source), &update);
            update.metadata
        })
        .await
    }

    /// Add a worker callback's counts to one source's stage
    pub async fn tally(
        &self,
        entity_id: &str,
        source: Source,
        stage: Stage,
        delta: TallyDelta,
    ) -> TrackerResult<EntityProgress> {
        validate_entity_id(entity_id)?;

        self.mutate("tally", entity_id, Some(stage), move |record| {
            let progress = source_tracker::tally(record.source_mut(source), stage, delta);
            debug!(
                entity_id,
                %source,
                %stage,
                successful = progress.successful,
                errors = progress.errors,
                total = progress.total,
                status = %progress.status,
                "Tallied"
            );
            ProgressMetadata::default()
        })
        .await
    }

    /// Clear one source's progress, or every source's and the entity's own
    ///
    /// A supplied `request_id` is stamped on what was cleared.
    pub async fn reset(
        &self,
        entity_id: &str,
        target: ResetTarget,
        request_id: Option<String>,
    ) -> TrackerResult<EntityProgress> {
        validate_entity_id(entity_id)?;
        validate_request_id(request_id.as_deref())?;

        self.mutate("reset", entity_id, None, move |record| {
            let stamp = request_id.map(ProgressMetadata::for_request).unwrap_or_default();

            for source in target.sources() {
                if let Some(source_record) = record.sources.get_mut(&source) {
                    source_tracker::reset(source_record);
                    source_record.metadata.merge_from(&stamp);
                }
            }
            if target == ResetTarget::All {
                record.progress = EntityProgress::default();
            }

            info!(entity_id, ?target, request_id = ?stamp.request_id, "Progress reset");
            stamp
        })
        .await
    }

    /// Initialize progress for a new request
    ///
    /// Every source and the entity get download `Processing` (unsized),
    /// no convert stage, and the request's metadata. Sources that end up not
    /// being queried must be reset so they stop holding download open.
    pub async fn start_request(
        &self,
        entity_id: &str,
        init: RequestInit,
    ) -> TrackerResult<EntityProgress> {
        validate_entity_id(entity_id)?;
        validate_request_id(Some(&init.request_id))?;

        let metadata = ProgressMetadata {
            request_id: Some(init.request_id),
            started_at: Some(init.started_at.unwrap_or_else(Utc::now)),
            trigger_consolidated: init.trigger_consolidated,
        };

        self.mutate("start_request", entity_id, None, move |record| {
            let initial = QueryProgress {
                download: Some(StageProgress::new(ProgressStatus::Processing)),
                convert: None,
                metadata: metadata.clone(),
            };
            for source in Source::ALL {
                record.sources.insert(source, initial.clone());
            }
            record.progress = initial;

            info!(entity_id, request_id = ?metadata.request_id, "Request started");
            metadata
        })
        .await
    }

    /// Last committed entity aggregate, without locking
    ///
    /// An entity never written reports empty progress.
    pub async fn get_aggregate(&self, entity_id: &str) -> TrackerResult<EntityProgress> {
        validate_entity_id(entity_id)?;

        Ok(self
            .store
            .read(entity_id)
            .await?
            .map(|record| record.progress)
            .unwrap_or_default())
    }

    /// Last committed progress of one source, without locking
    pub async fn get_source_progress(
        &self,
        entity_id: &str,
        source: Source,
    ) -> TrackerResult<Option<SourceProgressRecord>> {
        validate_entity_id(entity_id)?;

        Ok(self
            .store
            .read(entity_id)
            .await?
            .and_then(|mut record| record.sources.remove(&source)))
    }

    /// Run one locked read-modify-write cycle
    ///
    /// `apply` mutates the record and returns the metadata the caller
    /// supplied, which is merged into the entity's before re-aggregating.
    async fn mutate<F>(
        &self,
        operation: &'static str,
        entity_id: &str,
        stage: Option<Stage>,
        apply: F,
    ) -> TrackerResult<EntityProgress>
    where
        F: FnOnce(&mut EntityRecord) -> ProgressMetadata + Send,
    {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(self.max_lock_wait_ms);

        let mut tx = retry_on_lock(operation, self.max_lock_wait_ms, || {
            self.store
                .begin(entity_id, deadline.saturating_duration_since(Instant::now()))
        })
        .await?;
        let lock_wait_ms = start.elapsed().as_millis() as u64;

        let previous = tx.record().progress.clone();
        let mut record = tx.record().clone();

        let supplied = apply(&mut record);
        record.progress.metadata.merge_from(&supplied);
        record.progress = aggregate(&record.progress, &record.sources);

        let progress = record.progress.clone();
        tx.write(record);
        tx.commit().await?;

        debug!(
            entity_id,
            operation,
            lock_wait_ms,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Progress committed"
        );

        let notification = ProgressNotification {
            entity_id: entity_id.to_string(),
            request_id: progress.metadata.request_id.clone(),
            stage,
            previous,
            progress: progress.clone(),
        };
        if let Err(err) = self.notifier.notify(&notification).await {
            warn!(
                entity_id,
                operation,
                error = %err,
                "Completion notifier failed; progress is committed"
            );
        }

        Ok(progress)
    }
}

fn validate_entity_id(entity_id: &str) -> TrackerResult<()> {
    if entity_id.trim().is_empty() {
        return Err(TrackerError::InvalidInput(
            "entity id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_request_id(request_id: Option<&str>) -> TrackerResult<()> {
    match request_id {
        Some(id) if id.trim().is_empty() => Err(TrackerError::InvalidInput(
            "request id must not be empty".to_string(),
        )),
        _ => Ok(()),
    }
}
