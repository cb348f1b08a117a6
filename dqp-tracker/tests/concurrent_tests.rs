//! Integration tests for concurrent access patterns
//!
//! Many workers tally the same (entity, source, stage) at once; none of their
//! updates may be lost and completion must be announced exactly once.

mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use dqp_common::events::{EventBus, ProgressEvent};
use dqp_common::models::{ProgressStatus, Source, Stage};
use dqp_tracker::{
    EventBusNotifier, InMemoryRecordStore, ProgressTracker, ProgressUpdate, RecordStore,
    SqliteRecordStore, StageUpdate, TallyDelta, TrackerError,
};
use helpers::create_test_db;

const WORKERS: u64 = 24;

async fn size_download(tracker: &ProgressTracker, entity_id: &str, source: Source, total: u64) {
    tracker
        .set_progress(
            entity_id,
            source,
            ProgressUpdate::new()
                .with_request_id("req-1")
                .with_stage(Stage::Download, StageUpdate::sized(total, ProgressStatus::Processing)),
        )
        .await
        .unwrap();
}

/// Spawn one `+1 successful` tally per worker and wait for all of them
async fn tally_concurrently(tracker: &ProgressTracker, entity_id: &str, source: Source, workers: u64) {
    let mut join_set = JoinSet::new();

    for i in 0..workers {
        let tracker = tracker.clone();
        let entity_id = entity_id.to_string();
        join_set.spawn(async move {
            tracker
                .tally(&entity_id, source, Stage::Download, TallyDelta::successful(1))
                .await
                .unwrap_or_else(|e| panic!("worker {} failed: {}", i, e))
        });
    }

    let mut completed = 0;
    while let Some(result) = join_set.join_next().await {
        result.expect("worker panicked");
        completed += 1;
    }
    assert_eq!(completed, workers);
}

async fn assert_all_tallies_landed(tracker: &ProgressTracker, entity_id: &str, total: u64) {
    let download = tracker
        .get_aggregate(entity_id)
        .await
        .unwrap()
        .download
        .unwrap();

    assert_eq!(download.successful, total, "lost tally updates");
    assert_eq!(download.total, total);
    assert_eq!(download.status, ProgressStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tallies_in_memory() {
    let tracker = ProgressTracker::new(Arc::new(InMemoryRecordStore::new()));
    size_download(&tracker, "patient-1", Source::CommonWell, WORKERS).await;

    tally_concurrently(&tracker, "patient-1", Source::CommonWell, WORKERS).await;

    assert_all_tallies_landed(&tracker, "patient-1", WORKERS).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tallies_sqlite() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let tracker = ProgressTracker::new(Arc::new(SqliteRecordStore::new(pool)));
    size_download(&tracker, "patient-1", Source::CommonWell, WORKERS).await;

    tally_concurrently(&tracker, "patient-1", Source::CommonWell, WORKERS).await;

    assert_all_tallies_landed(&tracker, "patient-1", WORKERS).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tallies_across_sources() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let tracker = ProgressTracker::new(Arc::new(SqliteRecordStore::new(pool)));
    size_download(&tracker, "patient-1", Source::CommonWell, WORKERS / 2).await;
    size_download(&tracker, "patient-1", Source::Carequality, WORKERS / 2).await;

    let cw = tally_concurrently(&tracker, "patient-1", Source::CommonWell, WORKERS / 2);
    let cq = tally_concurrently(&tracker, "patient-1", Source::Carequality, WORKERS / 2);
    tokio::join!(cw, cq);

    assert_all_tallies_landed(&tracker, "patient-1", WORKERS).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_announced_once() {
    let bus = EventBus::new(256);
    let mut rx = bus.subscribe();
    let tracker = ProgressTracker::new(Arc::new(InMemoryRecordStore::new()))
        .with_notifier(Arc::new(EventBusNotifier::new(bus)));
    size_download(&tracker, "patient-1", Source::CommonWell, WORKERS).await;

    // twice as many callbacks as documents: late duplicates after completion
    tally_concurrently(&tracker, "patient-1", Source::CommonWell, WORKERS * 2).await;

    let mut finished = 0;
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::StageFinished { stage, .. } = event {
            assert_eq!(stage, Stage::Download);
            finished += 1;
        }
    }
    assert_eq!(finished, 1);
}

/// Hold patient-1's lock through `store` and check patient-2 stays free
async fn assert_entities_independent(store: Arc<dyn RecordStore>) {
    let tracker = ProgressTracker::new(store.clone()).with_max_lock_wait_ms(100);

    // hold patient-1's lock for the duration of the check
    let held = store.begin("patient-1", Duration::from_secs(1)).await.unwrap();

    let started = Instant::now();
    tracker
        .tally("patient-2", Source::Carequality, Stage::Convert, TallyDelta::successful(1))
        .await
        .unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "patient-2 waited on patient-1's lock"
    );

    let started = Instant::now();
    let blocked = tracker
        .tally("patient-1", Source::Carequality, Stage::Convert, TallyDelta::successful(1))
        .await;
    assert!(matches!(blocked, Err(TrackerError::LockTimeout { max_wait_ms: 100, .. })));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "lock wait ignored the configured bound"
    );

    drop(held);
    tracker
        .tally("patient-1", Source::Carequality, Stage::Convert, TallyDelta::successful(1))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_entities_do_not_block_each_other() {
    assert_entities_independent(Arc::new(InMemoryRecordStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_entities_do_not_block_each_other_sqlite() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    assert_entities_independent(Arc::new(SqliteRecordStore::new(pool))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tallies_on_many_entities_sqlite() {
    let (_temp_dir, pool) = create_test_db().await.unwrap();
    let store = Arc::new(SqliteRecordStore::new(pool));
    let tracker = ProgressTracker::new(store.clone());
    let entities: Vec<String> = (0..4).map(|i| format!("patient-{i}")).collect();

    for entity_id in &entities {
        size_download(&tracker, entity_id, Source::CommonWell, WORKERS / 4).await;
    }

    let mut join_set = JoinSet::new();
    for entity_id in entities.clone() {
        let tracker = tracker.clone();
        join_set.spawn(async move {
            tally_concurrently(&tracker, &entity_id, Source::CommonWell, WORKERS / 4).await;
        });
    }
    while let Some(result) = join_set.join_next().await {
        result.expect("entity workers panicked");
    }

    for entity_id in &entities {
        assert_all_tallies_landed(&tracker, entity_id, WORKERS / 4).await;
    }
    assert_eq!(store.locked_entities().unwrap(), 0);
}
