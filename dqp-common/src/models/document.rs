//! Progress documents for one source or one entity, and the entity record
//! that owns them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Source, Stage, StageProgress};

/// Request-scoped metadata carried alongside stage progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_consolidated: Option<bool>,
}

impl ProgressMetadata {
    pub fn for_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.request_id.is_none() && self.started_at.is_none() && self.trigger_consolidated.is_none()
    }

    /// Last-write-wins, field by field: every field `newer` supplies replaces
    /// ours, every field it leaves out is kept.
    pub fn merge_from(&mut self, newer: &ProgressMetadata) {
        if let Some(request_id) = &newer.request_id {
            self.request_id = Some(request_id.clone());
        }
        if let Some(started_at) = newer.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(trigger) = newer.trigger_consolidated {
            self.trigger_consolidated = Some(trigger);
        }
    }
}

/// Download/convert progress plus request metadata
///
/// The same shape is used per source and for the entity-wide aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<StageProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<StageProgress>,
    #[serde(flatten)]
    pub metadata: ProgressMetadata,
}

/// Progress one source reported for one entity
pub type SourceProgressRecord = QueryProgress;

/// Progress aggregated across every source of one entity
pub type EntityProgress = QueryProgress;

impl QueryProgress {
    pub fn stage(&self, stage: Stage) -> Option<&StageProgress> {
        match stage {
            Stage::Download => self.download.as_ref(),
            Stage::Convert => self.convert.as_ref(),
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut Option<StageProgress> {
        match stage {
            Stage::Download => &mut self.download,
            Stage::Convert => &mut self.convert,
        }
    }

    pub fn set_stage(&mut self, stage: Stage, progress: Option<StageProgress>) {
        *self.stage_mut(stage) = progress;
    }

    /// Stages that currently have progress
    pub fn stages(&self) -> impl Iterator<Item = (Stage, &StageProgress)> {
        Stage::ALL
            .into_iter()
            .filter_map(move |stage| self.stage(stage).map(|p| (stage, p)))
    }

    /// Drop both stages, leaving metadata alone
    pub fn clear_stages(&mut self) {
        self.download = None;
        self.convert = None;
    }

    pub fn request_id(&self) -> Option<&str> {
        self.metadata.request_id.as_deref()
    }

    /// True when every present stage is terminal (and at least one is present)
    pub fn is_finished(&self) -> bool {
        let mut stages = self.stages().peekable();
        stages.peek().is_some() && stages.all(|(_, p)| p.status.is_terminal())
    }
}

/// Everything persisted for one entity: its aggregate plus each source's record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: String,
    pub progress: EntityProgress,
    #[serde(default)]
    pub sources: BTreeMap<Source, SourceProgressRecord>,
}

impl EntityRecord {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            progress: EntityProgress::default(),
            sources: BTreeMap::new(),
        }
    }

    pub fn source(&self, source: Source) -> Option<&SourceProgressRecord> {
        self.sources.get(&source)
    }

    /// Source record, created empty on first touch
    pub fn source_mut(&mut self, source: Source) -> &mut SourceProgressRecord {
        self.sources.entry(source).or_default()
    }
}
