//! Continuation planning
//!
//! After a mutation the orchestrating caller decides what dependent work to
//! kick off. [`plan_continuations`] derives that from a notification;
//! [`dispatch_continuations`] hands the plan to a [`ContinuationTrigger`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dqp_common::models::Stage;
use dqp_common::Result;

use super::notifier::ProgressNotification;

/// Follow-up work unlocked by a progress change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Continuation {
    /// Convert stage finished and the request asked for a consolidated rebuild
    RebuildConsolidated {
        entity_id: String,
        request_id: Option<String>,
    },
    /// The entity's request is done; the next queued request may start
    DispatchQueued { entity_id: String },
}

/// Decide what follow-up work a committed mutation unlocks
pub fn plan_continuations(notification: &ProgressNotification) -> Vec<Continuation> {
    let mut plan = Vec::new();

    let convert_finished = notification
        .finished_stages()
        .iter()
        .any(|(stage, _)| *stage == Stage::Convert);
    let wants_rebuild = notification.progress.metadata.trigger_consolidated == Some(true);

    if convert_finished && wants_rebuild {
        plan.push(Continuation::RebuildConsolidated {
            entity_id: notification.entity_id.clone(),
            request_id: notification.request_id.clone(),
        });
    }

    if notification.just_finished() {
        plan.push(Continuation::DispatchQueued {
            entity_id: notification.entity_id.clone(),
        });
    }

    plan
}

/// Starts dependent work
#[async_trait]
pub trait ContinuationTrigger: Send + Sync {
    async fn trigger(&self, continuation: &Continuation) -> Result<()>;
}

/// Plan and trigger continuations for one notification
///
/// Trigger failures are logged and skipped; returns how many continuations
/// were started.
pub async fn dispatch_continuations(
    trigger: &dyn ContinuationTrigger,
    notification: &ProgressNotification,
) -> usize {
    let mut started = 0;

    for continuation in plan_continuations(notification) {
        match trigger.trigger(&continuation).await {
            Ok(()) => {
                debug!(entity_id = %notification.entity_id, ?continuation, "Continuation started");
                started += 1;
            }
            Err(err) => {
                warn!(
                    entity_id = %notification.entity_id,
                    ?continuation,
                    error = %err,
                    "Continuation failed to start"
                );
            }
        }
    }

    started
}
