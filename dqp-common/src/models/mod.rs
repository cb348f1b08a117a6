//! Progress model shared by the tracker and its consumers

mod document;
mod progress;
mod source;

pub use document::{
    EntityProgress, EntityRecord, ProgressMetadata, QueryProgress, SourceProgressRecord,
};
pub use progress::{ProgressStatus, Stage, StageProgress};
pub use source::{ResetTarget, Source};
