//! Completion notification
//!
//! The tracker hands every committed mutation to a [`CompletionNotifier`]
//! after the transaction is committed. Delivery is at-least-once from the
//! tracker's side; deduplication of terminal transitions belongs to the
//! notifier.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use dqp_common::events::{EventBus, ProgressEvent};
use dqp_common::models::{EntityProgress, Stage, StageProgress};
use dqp_common::{Error, Result};

/// State handed to the notifier after a committed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressNotification {
    pub entity_id: String,
    pub request_id: Option<String>,
    /// Stage a tally touched; `None` for set/reset/start
    pub stage: Option<Stage>,
    /// Entity progress as it was before the mutation
    pub previous: EntityProgress,
    /// Entity progress as committed
    pub progress: EntityProgress,
}

impl ProgressNotification {
    /// Stages that became terminal for the whole entity with this mutation
    pub fn finished_stages(&self) -> Vec<(Stage, StageProgress)> {
        self.progress
            .stages()
            .filter(|(_, progress)| progress.status.is_terminal())
            .filter(|(stage, _)| {
                self.previous
                    .stage(*stage)
                    .map_or(true, |before| !before.status.is_terminal())
            })
            .map(|(stage, progress)| (stage, *progress))
            .collect()
    }

    /// True when this mutation left every present stage terminal
    pub fn just_finished(&self) -> bool {
        self.progress.is_finished() && !self.previous.is_finished()
    }
}

/// Receives every committed progress change
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// Observe a committed mutation
    ///
    /// Errors are logged by the caller and never roll back the mutation.
    async fn notify(&self, notification: &ProgressNotification) -> Result<()>;
}

/// Notifier that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CompletionNotifier for NoopNotifier {
    async fn notify(&self, _notification: &ProgressNotification) -> Result<()> {
        Ok(())
    }
}

/// Finished entities whose announcements are kept for late redeliveries
pub const DEFAULT_RETAINED_FINISHED: usize = 1024;

/// Stages already announced for the entity's current request
#[derive(Debug, Default)]
struct Announced {
    request_id: Option<String>,
    stages: HashSet<Stage>,
    finished: bool,
}

/// Announcement state of every entity that announced something
///
/// Entries of cleared entities are dropped at once. Finished entities queue
/// up in `finished` and only the newest `retain_finished` of them are kept.
/// Entities still in progress are never dropped.
#[derive(Debug, Default)]
struct Announcements {
    entities: HashMap<String, Announced>,
    finished: VecDeque<String>,
}

impl Announcements {
    fn observe(&mut self, notification: &ProgressNotification, retain_finished: usize) {
        let progress = &notification.progress;
        let entity_id = notification.entity_id.as_str();

        if progress.download.is_none() && progress.convert.is_none() {
            if self.entities.remove(entity_id).is_some() {
                debug!(entity_id, "Progress cleared, announcements dropped");
            }
            return;
        }

        let Some(entry) = self.entities.get_mut(entity_id) else {
            return;
        };
        let finished = progress.is_finished();
        if finished && !entry.finished {
            self.finished.push_back(entity_id.to_string());
        }
        entry.finished = finished;

        while self.finished.len() > retain_finished {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            // an entity that started over since it was queued stays
            if self.entities.get(&oldest).is_some_and(|entry| entry.finished) {
                self.entities.remove(&oldest);
            }
        }
    }
}

/// Publishes progress onto an [`EventBus`]
///
/// Every notification becomes a `ProgressUpdated` event. A `StageFinished`
/// event is published at most once per (entity, request, stage); only the
/// latest request of each entity is remembered, and only for as long as the
/// entity is in progress or among the most recently finished.
#[derive(Debug)]
pub struct EventBusNotifier {
    bus: EventBus,
    announced: Mutex<Announcements>,
    retain_finished: usize,
}

impl EventBusNotifier {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            announced: Mutex::new(Announcements::default()),
            retain_finished: DEFAULT_RETAINED_FINISHED,
        }
    }

    pub fn with_retained_finished(mut self, retain_finished: usize) -> Self {
        self.retain_finished = retain_finished;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Number of entities whose announcements are remembered
    pub fn tracked_entities(&self) -> Result<usize> {
        Ok(self.announcements()?.entities.len())
    }

    fn announcements(&self) -> Result<MutexGuard<'_, Announcements>> {
        self.announced
            .lock()
            .map_err(|_| Error::Internal("notifier state poisoned".to_string()))
    }

    /// Record the stages as announced, returning those not announced before
    fn claim(
        &self,
        notification: &ProgressNotification,
        finished: Vec<(Stage, StageProgress)>,
    ) -> Result<Vec<(Stage, StageProgress)>> {
        let mut announcements = self.announcements()?;
        let request_id = notification.request_id.as_deref();

        let entry = announcements
            .entities
            .entry(notification.entity_id.clone())
            .or_default();
        if entry.request_id.as_deref() != request_id {
            entry.request_id = request_id.map(str::to_string);
            entry.stages.clear();
        }

        let fresh: Vec<_> = finished
            .into_iter()
            .filter(|(stage, _)| entry.stages.insert(*stage))
            .collect();

        announcements.observe(notification, self.retain_finished);
        Ok(fresh)
    }
}

#[async_trait]
impl CompletionNotifier for EventBusNotifier {
    async fn notify(&self, notification: &ProgressNotification) -> Result<()> {
        let timestamp = Utc::now();

        self.bus.emit_lossy(ProgressEvent::ProgressUpdated {
            entity_id: notification.entity_id.clone(),
            request_id: notification.request_id.clone(),
            stage: notification.stage,
            progress: notification.progress.clone(),
            timestamp,
        });

        let finished = notification.finished_stages();
        if finished.is_empty() {
            self.announcements()?
                .observe(notification, self.retain_finished);
            return Ok(());
        }

        let fresh = self.claim(notification, finished)?;

        for (stage, progress) in fresh {
            info!(
                entity_id = %notification.entity_id,
                request_id = ?notification.request_id,
                %stage,
                status = %progress.status,
                total = progress.total,
                successful = progress.successful,
                errors = progress.errors,
                "Stage finished for entity"
            );

            self.bus.emit_lossy(ProgressEvent::StageFinished {
                entity_id: notification.entity_id.clone(),
                request_id: notification.request_id.clone(),
                stage,
                status: progress.status,
                progress,
                timestamp,
            });
        }

        debug!(
            entity_id = %notification.entity_id,
            subscribers = self.bus.subscriber_count(),
            "Progress published"
        );
        Ok(())
    }
}
