//! dqp-tracker library interface
//!
//! Document query progress tracking: per-source progress for the download
//! and convert stages, aggregated into one entity-level view under an
//! exclusive per-entity transaction.

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod store;
pub mod utils;

pub use crate::error::{TrackerError, TrackerResult};
pub use crate::services::{
    CompletionNotifier, Continuation, ContinuationTrigger, EventBusNotifier, ProgressNotification,
    ProgressTracker, ProgressUpdate, RequestInit, StageUpdate, TallyDelta,
};
pub use crate::store::{InMemoryRecordStore, RecordStore, RecordTransaction, SqliteRecordStore};

use std::sync::Arc;

use dqp_common::config::TomlConfig;
use dqp_common::events::EventBus;
use sqlx::SqlitePool;

/// Shared tracker state for an embedding service
#[derive(Clone)]
pub struct TrackerState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Progress events (`ProgressUpdated`, `StageFinished`)
    pub event_bus: EventBus,
    pub tracker: ProgressTracker,
}

/// Open the database and wire the SQLite store, event bus and tracker
pub async fn build_tracker(config: &TomlConfig) -> anyhow::Result<TrackerState> {
    let db_path = config.database_path();
    let db = db::init_database_pool(&db_path).await?;
    tracing::info!("Progress database: {}", db_path.display());

    let max_lock_wait_ms = crate::config::resolve_max_lock_wait_ms(&db, config).await?;
    let event_bus = EventBus::new(config.event_capacity.max(1));

    let tracker = ProgressTracker::new(Arc::new(SqliteRecordStore::new(db.clone())))
        .with_notifier(Arc::new(EventBusNotifier::new(event_bus.clone())))
        .with_max_lock_wait_ms(max_lock_wait_ms);

    Ok(TrackerState {
        db,
        event_bus,
        tracker,
    })
}
