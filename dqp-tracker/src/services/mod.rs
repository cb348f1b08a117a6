//! Progress tracking services
//!
//! - [`source_tracker`]: mutation primitives for one source's record
//! - [`aggregation`]: entity-level aggregation across sources
//! - [`progress_tracker`]: the transactional mutator exposed to callers
//! - [`notifier`]: completion notification after commit
//! - [`continuation`]: follow-up work planning

pub mod aggregation;
pub mod continuation;
pub mod notifier;
pub mod progress_tracker;
pub mod source_tracker;

pub use aggregation::{aggregate, aggregate_stage, aggregate_status};
pub use continuation::{dispatch_continuations, plan_continuations, Continuation, ContinuationTrigger};
pub use notifier::{CompletionNotifier, EventBusNotifier, NoopNotifier, ProgressNotification};
pub use progress_tracker::{ProgressTracker, RequestInit, DEFAULT_MAX_LOCK_WAIT_MS};
pub use source_tracker::{ProgressUpdate, StageUpdate, TallyDelta};
