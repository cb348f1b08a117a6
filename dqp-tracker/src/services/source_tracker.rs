//! Mutation primitives for one source's progress record
//!
//! Pure functions over [`SourceProgressRecord`]; the transactional mutator
//! runs them under the entity lock. Two kinds of writers exist:
//!
//! - `set_progress` owns `total` and `status` (dispatch, sizing, forced failure)
//! - `tally` owns `successful` and `errors` (per-document worker callbacks)
//!
//! Neither ever moves a terminal stage back to `Processing`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dqp_common::models::{
    ProgressMetadata, ProgressStatus, SourceProgressRecord, Stage, StageProgress,
};

/// Requested change to one stage's total/status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub total: Option<u64>,
    pub status: Option<ProgressStatus>,
}

impl StageUpdate {
    pub fn status(status: ProgressStatus) -> Self {
        Self {
            total: None,
            status: Some(status),
        }
    }

    pub fn sized(total: u64, status: ProgressStatus) -> Self {
        Self {
            total: Some(total),
            status: Some(status),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total.is_none() && self.status.is_none()
    }
}

/// Everything a `set_progress` call may change on a source record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub download: Option<StageUpdate>,
    pub convert: Option<StageUpdate>,
    /// Convertible documents found while downloading, added to the convert total
    pub convertible_found: Option<u64>,
    /// Convertible documents whose download failed; they will never be
    /// converted, so they are taken off the convert total
    pub convertible_download_errors: Option<u64>,
    pub metadata: ProgressMetadata,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Stage, update: StageUpdate) -> Self {
        match stage {
            Stage::Download => self.download = Some(update),
            Stage::Convert => self.convert = Some(update),
        }
        self
    }

    pub fn with_metadata(mut self, metadata: ProgressMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.metadata.request_id = Some(request_id.into());
        self
    }

    pub fn with_convertible_found(mut self, count: u64) -> Self {
        self.convertible_found = Some(count);
        self
    }

    pub fn with_convertible_download_errors(mut self, count: u64) -> Self {
        self.convertible_download_errors = Some(count);
        self
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageUpdate> {
        match stage {
            Stage::Download => self.download.as_ref(),
            Stage::Convert => self.convert.as_ref(),
        }
    }

    fn touches_stages(&self) -> bool {
        Stage::ALL
            .iter()
            .any(|stage| self.stage(*stage).is_some_and(|u| !u.is_empty()))
            || self.convertible_found.is_some()
            || self.convertible_download_errors.is_some()
    }

    /// Nothing to apply: no stage field and no metadata
    pub fn is_noop(&self) -> bool {
        !self.touches_stages() && self.metadata.is_empty()
    }
}

/// Counters a worker callback adds to one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyDelta {
    #[serde(default)]
    pub successful: u64,
    #[serde(default)]
    pub errors: u64,
}

impl TallyDelta {
    pub fn successful(count: u64) -> Self {
        Self {
            successful: count,
            errors: 0,
        }
    }

    pub fn errors(count: u64) -> Self {
        Self {
            successful: 0,
            errors: count,
        }
    }
}

/// Apply a `set_progress` update to a source record
///
/// A `request_id` different from the record's current one supersedes the
/// record: its stages are dropped before the update applies.
pub fn set_progress(record: &mut SourceProgressRecord, update: &ProgressUpdate) {
    if let (Some(current), Some(incoming)) =
        (record.metadata.request_id.as_deref(), update.metadata.request_id.as_deref())
    {
        if current != incoming {
            info!(
                previous_request = current,
                request_id = incoming,
                "New request supersedes source progress"
            );
            record.clear_stages();
        }
    }

    record.metadata.merge_from(&update.metadata);

    for stage in Stage::ALL {
        if let Some(stage_update) = update.stage(stage).filter(|u| !u.is_empty()) {
            let current = record.stage(stage).copied();
            record.set_stage(stage, Some(apply_stage_update(stage, current, stage_update)));
        }
    }

    if update.convertible_found.is_some() || update.convertible_download_errors.is_some() {
        let current = record.convert;
        record.convert = Some(adjust_convert_total(
            current,
            update.convertible_found.unwrap_or(0),
            update.convertible_download_errors.unwrap_or(0),
        ));
    }
}

fn apply_stage_update(
    stage: Stage,
    current: Option<StageProgress>,
    update: &StageUpdate,
) -> StageProgress {
    let mut progress = current.unwrap_or_else(|| StageProgress::new(ProgressStatus::Processing));

    if let Some(total) = update.total {
        progress.total = total;
    }

    match update.status {
        Some(ProgressStatus::Processing) if progress.status.is_terminal() => {
            warn!(
                %stage,
                status = %progress.status,
                "Ignoring attempt to move a terminal stage back to processing"
            );
        }
        Some(status) => progress.status = status,
        None => {}
    }

    complete_if_sized_and_done(stage, progress)
}

fn adjust_convert_total(current: Option<StageProgress>, found: u64, download_errors: u64) -> StageProgress {
    let mut progress = current.unwrap_or_else(|| StageProgress::new(ProgressStatus::Processing));
    let was_sized = progress.is_sized();

    progress.total = progress.total.saturating_add(found).saturating_sub(download_errors);

    debug!(
        found,
        download_errors,
        total = progress.total,
        "Adjusted convert total"
    );

    if was_sized && !progress.is_sized() && progress.status == ProgressStatus::Processing {
        // every expected document failed to download: nothing left to convert
        progress.status = ProgressStatus::Completed;
        return progress;
    }

    complete_if_sized_and_done(Stage::Convert, progress)
}

/// A sized, processing stage whose tallies reached the total is complete
fn complete_if_sized_and_done(stage: Stage, mut progress: StageProgress) -> StageProgress {
    if progress.status == ProgressStatus::Processing
        && progress.is_sized()
        && progress.tallies_reach_total()
    {
        debug!(%stage, total = progress.total, "Stage reached its total");
        progress.status = ProgressStatus::Completed;
    }
    progress
}

/// Add a worker callback's counts to one stage and recompute its status
///
/// Returns the stage as updated. A stage with no known total completes on the
/// first tally; a terminal stage keeps its status but still accumulates
/// counts.
pub fn tally(record: &mut SourceProgressRecord, stage: Stage, delta: TallyDelta) -> StageProgress {
    let mut progress = record
        .stage(stage)
        .copied()
        .unwrap_or_else(|| StageProgress::new(ProgressStatus::Processing));

    progress.successful = progress.successful.saturating_add(delta.successful);
    progress.errors = progress.errors.saturating_add(delta.errors);

    if progress.status == ProgressStatus::Processing && progress.tallies_reach_total() {
        progress.status = ProgressStatus::Completed;
    } else if progress.status.is_terminal() {
        debug!(%stage, status = %progress.status, "Tally on terminal stage");
    }

    if progress.is_overcounted() {
        warn!(
            %stage,
            total = progress.total,
            successful = progress.successful,
            errors = progress.errors,
            "Tallied more items than the stage total"
        );
    }

    record.set_stage(stage, Some(progress));
    progress
}

/// Clear a source's stage progress, keeping its metadata
pub fn reset(record: &mut SourceProgressRecord) {
    record.clear_stages();
}
