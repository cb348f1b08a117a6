//! Progress events and the broadcast bus that carries them
//!
//! Events are broadcast via [`EventBus`] and serialize with a `type` tag so
//! they can be forwarded verbatim to webhook or SSE consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{EntityProgress, ProgressStatus, Stage, StageProgress};

/// Progress event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Entity-level progress changed
    ///
    /// Emitted after every committed mutation, terminal or not.
    ProgressUpdated {
        entity_id: String,
        request_id: Option<String>,
        /// Stage a tally touched, if the mutation was a tally
        stage: Option<Stage>,
        progress: EntityProgress,
        timestamp: DateTime<Utc>,
    },

    /// A stage reached a terminal status for the whole entity
    ///
    /// Emitted at most once per (entity, request, stage).
    StageFinished {
        entity_id: String,
        request_id: Option<String>,
        stage: Stage,
        status: ProgressStatus,
        progress: StageProgress,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::ProgressUpdated { entity_id, .. } | Self::StageFinished { entity_id, .. } => {
                entity_id
            }
        }
    }
}

/// Broadcast bus for [`ProgressEvent`]s
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProgressEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ProgressEvent,
    ) -> Result<usize, broadcast::error::SendError<ProgressEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
