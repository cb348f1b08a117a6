//! Entity-level aggregation across sources
//!
//! The entity aggregate is always recomputed from the full set of source
//! records, never patched. A source with no progress for a stage (never
//! queried, or reset) counts as `Completed` with zero counters, so it can
//! never hold the entity at `Processing` and outweighs a failure elsewhere.

use std::collections::BTreeMap;

use tracing::warn;

use dqp_common::models::{
    EntityProgress, ProgressStatus, Source, SourceProgressRecord, Stage, StageProgress,
};

/// Combine per-source statuses into one
///
/// `Processing` dominates, then `Completed`, then `Failed`. No statuses at
/// all is vacuously `Completed`.
pub fn aggregate_status<I>(statuses: I) -> ProgressStatus
where
    I: IntoIterator<Item = ProgressStatus>,
{
    let mut any_completed = false;
    let mut any_failed = false;

    for status in statuses {
        match status {
            ProgressStatus::Processing => return ProgressStatus::Processing,
            ProgressStatus::Completed => any_completed = true,
            ProgressStatus::Failed => any_failed = true,
        }
    }

    if any_failed && !any_completed {
        ProgressStatus::Failed
    } else {
        ProgressStatus::Completed
    }
}

/// Sum one stage across sources
///
/// Each item is one source's progress for the stage; `None` stands for a
/// source without it and contributes `Completed` with zero counters.
/// Returns `None` when no source reports the stage.
pub fn aggregate_stage<'a, I>(stage: Stage, reports: I) -> Option<StageProgress>
where
    I: IntoIterator<Item = Option<&'a StageProgress>>,
{
    let mut statuses = Vec::new();
    let mut sum = StageProgress::vacant();
    let mut any_reported = false;

    for report in reports {
        let Some(progress) = report else {
            statuses.push(ProgressStatus::Completed);
            continue;
        };
        any_reported = true;
        sum.total = sum.total.saturating_add(progress.total);
        sum.successful = sum.successful.saturating_add(progress.successful);
        sum.errors = sum.errors.saturating_add(progress.errors);
        statuses.push(progress.status);
    }

    if !any_reported {
        return None;
    }
    sum.status = aggregate_status(statuses);

    if sum.is_overcounted() {
        warn!(
            %stage,
            total = sum.total,
            successful = sum.successful,
            errors = sum.errors,
            "Aggregated counters exceed total"
        );
    }

    Some(sum)
}

/// Recompute entity progress from the prior aggregate and every source record
///
/// Metadata is taken from `prior` as-is; callers merge the triggering
/// mutation's metadata into it first. A stage the prior aggregate had but no
/// source reports any more stays present as completed with zero counters.
pub fn aggregate(
    prior: &EntityProgress,
    sources: &BTreeMap<Source, SourceProgressRecord>,
) -> EntityProgress {
    let mut progress = EntityProgress {
        metadata: prior.metadata.clone(),
        ..EntityProgress::default()
    };

    for stage in Stage::ALL {
        let reported = aggregate_stage(
            stage,
            Source::ALL
                .into_iter()
                .map(|source| sources.get(&source).and_then(|record| record.stage(stage))),
        );

        let stage_progress = match reported {
            Some(sum) => Some(sum),
            None if prior.stage(stage).is_some() => Some(StageProgress::vacant()),
            None => None,
        };
        progress.set_stage(stage, stage_progress);
    }

    progress
}
