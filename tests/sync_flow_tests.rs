// End-to-end sync flows against real file-backed local storage.
//
// The inline engine tests cover the state machine with in-memory stores;
// these runs exercise the same flows with the anchor persisted on disk,
// including recovery from a corrupt slot.

use std::fs;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rstest::rstest;
use uuid::Uuid;

use sleep_sync::adapters::file_store::FileAnchorStore;
use sleep_sync::adapters::in_memory::in_memory_grant_source::InMemoryGrantSource;
use sleep_sync::adapters::in_memory::recording_sink::RecordingSink;
use sleep_sync::adapters::in_memory::scripted_feed::ScriptedFeed;
use sleep_sync::application::background::{Acknowledgment, BackgroundDelivery};
use sleep_sync::application::participant::{GatedSink, ParticipantGate};
use sleep_sync::application::sync_engine::{SleepSyncEngine, SyncConfig};
use sleep_sync::core::record::SourceRecord;

fn init_tracing() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("sleep_sync=debug")
        .try_init()
        .ok();
}

fn record_days_ago(days: i64) -> SourceRecord {
    let start = Utc::now() - Duration::days(days);
    SourceRecord {
        uuid: Uuid::new_v4(),
        start_time: start,
        end_time: start + Duration::hours(8),
        raw_stage: 3,
        source_bundle_id: Some("com.example.watch".to_string()),
    }
}

#[rstest]
#[tokio::test]
async fn it_should_survive_restarts_between_runs() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let anchor_path = dir.path().join("anchor");
    let feed = ScriptedFeed::new();
    let sink = RecordingSink::new();
    let owner = Uuid::new_v4();

    // First process lifetime: backfill and prime.
    feed.seed_history(vec![record_days_ago(1), record_days_ago(2)]);
    {
        let engine = SleepSyncEngine::new(
            owner,
            SyncConfig::default(),
            FileAnchorStore::new(&anchor_path),
            feed.clone(),
            sink.clone(),
        );
        let outcome = engine.sync().await.expect("first run");
        assert!(outcome.backfilled);
        assert_eq!(outcome.uploaded, 2);
    }

    // Second process lifetime: a fresh engine picks up the saved anchor and
    // runs incrementally.
    feed.push_changes(vec![record_days_ago(0)]);
    {
        let engine = SleepSyncEngine::new(
            owner,
            SyncConfig::default(),
            FileAnchorStore::new(&anchor_path),
            feed.clone(),
            sink.clone(),
        );
        let outcome = engine.sync().await.expect("second run");
        assert!(!outcome.backfilled, "anchor survived the restart");
        assert_eq!(outcome.uploaded, 1);
    }

    assert_eq!(sink.stored_row_count(), 3);
}

#[rstest]
#[tokio::test]
async fn it_should_fall_back_to_backfill_after_anchor_corruption() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let anchor_path = dir.path().join("anchor");
    let feed = ScriptedFeed::new();
    let sink = RecordingSink::new();
    feed.seed_history(vec![record_days_ago(5)]);

    let engine = SleepSyncEngine::new(
        Uuid::new_v4(),
        SyncConfig::default(),
        FileAnchorStore::new(&anchor_path),
        feed.clone(),
        sink.clone(),
    );

    engine.sync().await.expect("first run backfills");
    assert!(anchor_path.exists());

    // Corrupt the slot between runs; the next sync must re-backfill instead
    // of failing.
    fs::write(&anchor_path, "garbage that is not base64!").expect("corrupt slot");
    let outcome = engine.sync().await.expect("recovery run");
    assert!(outcome.backfilled, "corrupt anchor reads as never synced");
    assert_eq!(
        sink.stored_row_count(),
        1,
        "re-uploaded history merges into the same row"
    );
}

#[rstest]
#[tokio::test]
async fn it_should_run_the_background_path_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let anchors = FileAnchorStore::new(dir.path().join("anchor"));
    let feed = ScriptedFeed::new();
    let sink = RecordingSink::new();
    let grants = InMemoryGrantSource::new();
    let gate = ParticipantGate::new(true);

    let engine = Arc::new(SleepSyncEngine::new(
        Uuid::new_v4(),
        SyncConfig::default(),
        anchors,
        feed.clone(),
        GatedSink::new(gate.clone(), sink.clone()),
    ));
    let delivery = BackgroundDelivery::new(engine, grants.clone());

    // First notification triggers the backfill-and-prime run.
    feed.seed_history(vec![record_days_ago(1)]);
    delivery
        .handle_change_notification(Acknowledgment::new(Box::new(|| {})))
        .await;
    assert_eq!(sink.stored_row_count(), 1);

    // Participant withdraws; later notifications no longer upload.
    gate.set_active(false);
    feed.push_changes(vec![record_days_ago(0)]);
    delivery
        .handle_change_notification(Acknowledgment::new(Box::new(|| {})))
        .await;
    assert_eq!(sink.stored_row_count(), 1, "inactive participant uploads nothing");

    assert_eq!(grants.begun(), 2);
    assert_eq!(grants.released(), 2, "no grant leaked on any path");
}
