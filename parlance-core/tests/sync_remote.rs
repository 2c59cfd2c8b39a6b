//! Sync engine behavior against an in-process stub of the companion server.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use parlance_core::{LocalStore, SyncConfig, SyncEngine, SyncOutcome};

/// How the stub answers record uploads.
#[derive(Clone, Copy)]
enum RecordMode {
    Accept,
    Reject,
    MalformedBody,
}

struct StubState {
    requests: AtomicUsize,
    accepted: Mutex<Vec<serde_json::Value>>,
    stats_pushes: Mutex<Vec<serde_json::Value>>,
    next_id: AtomicUsize,
    remote_words: u64,
    record_mode: RecordMode,
}

async fn ping(State(state): State<Arc<StubState>>) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn create_record(
    State(state): State<Arc<StubState>>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    state.requests.fetch_add(1, Ordering::SeqCst);
    match state.record_mode {
        RecordMode::Accept => {
            let n = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            state.accepted.lock().push(body);
            (
                StatusCode::CREATED,
                serde_json::json!({ "id": format!("srv-{n}") }).to_string(),
            )
        }
        RecordMode::Reject => (StatusCode::INTERNAL_SERVER_ERROR, String::new()),
        RecordMode::MalformedBody => (StatusCode::CREATED, "not json at all".to_string()),
    }
}

async fn get_stats(State(state): State<Arc<StubState>>) -> Json<serde_json::Value> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "totalWords": state.remote_words,
        "totalTranscriptions": 12,
        "totalDuration": 345.0,
    }))
}

async fn post_stats(
    State(state): State<Arc<StubState>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state.stats_pushes.lock().push(body);
    StatusCode::OK
}

async fn spawn_stub(record_mode: RecordMode, remote_words: u64) -> (Arc<StubState>, String) {
    let state = Arc::new(StubState {
        requests: AtomicUsize::new(0),
        accepted: Mutex::new(Vec::new()),
        stats_pushes: Mutex::new(Vec::new()),
        next_id: AtomicUsize::new(0),
        remote_words,
        record_mode,
    });
    let app = Router::new()
        .route("/api/parlance/ping", get(ping))
        .route("/api/parlance/transcriptions", post(create_record))
        .route("/api/parlance/stats", get(get_stats).post(post_stats))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, address)
}

fn engine_for(store: &Arc<LocalStore>, address: &str) -> SyncEngine {
    SyncEngine::new(
        Arc::clone(store),
        SyncConfig {
            server_address: address.to_string(),
            device_tag: "desktop".into(),
        },
    )
}

#[tokio::test]
async fn accepted_upload_marks_record_synced() {
    let (stub, address) = spawn_stub(RecordMode::Accept, 0).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let record = store.save_dictation("hello world", 2.0).unwrap();
    let engine = engine_for(&store, &address);

    let outcome = engine.sync_record(&record).await;
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            remote_id: "srv-1".into()
        }
    );

    let stored = store.get(&record.id).unwrap().unwrap();
    assert!(stored.is_synced);
    assert_eq!(stored.remote_id.as_deref(), Some("srv-1"));

    let uploads = stub.accepted.lock();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0]["id"], record.id.as_str());
    assert_eq!(uploads[0]["text"], "hello world");
    assert_eq!(uploads[0]["wordCount"], 2);
    assert_eq!(uploads[0]["device"], "desktop");
    // createdAt travels as an ISO-8601 string.
    assert!(uploads[0]["createdAt"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn synced_record_is_never_uploaded_again() {
    let (stub, address) = spawn_stub(RecordMode::Accept, 0).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let record = store.save_dictation("only once", 1.0).unwrap();
    let engine = engine_for(&store, &address);

    assert!(matches!(
        engine.sync_record(&record).await,
        SyncOutcome::Synced { .. }
    ));
    let after_first = stub.requests.load(Ordering::SeqCst);

    let synced = store.get(&record.id).unwrap().unwrap();
    let outcome = engine.sync_record(&synced).await;
    assert_eq!(outcome, SyncOutcome::AlreadySynced);
    // No probe, no upload: the request count is unchanged.
    assert_eq!(stub.requests.load(Ordering::SeqCst), after_first);
}

#[tokio::test]
async fn unreachable_server_leaves_record_untouched() {
    // Bind an ephemeral port, then free it so connections are refused.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", dead.local_addr().unwrap().port());
    drop(dead);

    let store = Arc::new(LocalStore::in_memory().unwrap());
    let record = store.save_dictation("still local", 1.0).unwrap();
    let engine = engine_for(&store, &address);

    let outcome = engine.sync_record(&record).await;
    assert_eq!(outcome, SyncOutcome::Offline);
    assert!(!engine.is_connected());

    let stored = store.get(&record.id).unwrap().unwrap();
    assert!(!stored.is_synced);
    assert!(stored.remote_id.is_none());
}

#[tokio::test]
async fn disabled_sync_short_circuits_everything() {
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let record = store.save_dictation("offline first", 1.0).unwrap();
    let engine = SyncEngine::new(Arc::clone(&store), SyncConfig::default());

    assert_eq!(engine.sync_record(&record).await, SyncOutcome::Disabled);
    assert_eq!(engine.check_connectivity().await, None);
    assert!(!engine.sync_stats().await);
    assert!(engine.fetch_stats().await.is_none());

    let stored = store.get(&record.id).unwrap().unwrap();
    assert!(!stored.is_synced);
}

#[tokio::test]
async fn rejected_upload_persists_nothing() {
    let (_stub, address) = spawn_stub(RecordMode::Reject, 0).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let record = store.save_dictation("rejected", 1.0).unwrap();
    let engine = engine_for(&store, &address);

    assert_eq!(engine.sync_record(&record).await, SyncOutcome::Failed);
    let stored = store.get(&record.id).unwrap().unwrap();
    assert!(!stored.is_synced);
    assert!(stored.remote_id.is_none());
}

#[tokio::test]
async fn malformed_accept_body_persists_nothing() {
    let (_stub, address) = spawn_stub(RecordMode::MalformedBody, 0).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let record = store.save_dictation("garbled", 1.0).unwrap();
    let engine = engine_for(&store, &address);

    assert_eq!(engine.sync_record(&record).await, SyncOutcome::Failed);
    let stored = store.get(&record.id).unwrap().unwrap();
    assert!(!stored.is_synced);
}

#[tokio::test]
async fn sync_all_walks_pending_records_oldest_first() {
    let (stub, address) = spawn_stub(RecordMode::Accept, 0).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let a = store.save_dictation("first note", 1.0).unwrap();
    let b = store.save_dictation("second note", 1.0).unwrap();
    let c = store.save_dictation("third note", 1.0).unwrap();
    // One record is already synced and must be skipped entirely.
    store.mark_synced(&b.id, "srv-pre").unwrap();

    let engine = engine_for(&store, &address);
    let report = engine.sync_all_unsynced().await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);

    let uploads = stub.accepted.lock();
    let ids: Vec<&str> = uploads.iter().map(|u| u["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![a.id.as_str(), c.id.as_str()]);

    assert!(store.list_unsynced().unwrap().is_empty());
}

#[tokio::test]
async fn stats_push_carries_totals_and_device_tag() {
    let (stub, address) = spawn_stub(RecordMode::Accept, 0).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    store.record_event(40, 16.0).unwrap();
    store.record_event(60, 24.0).unwrap();

    let engine = engine_for(&store, &address);
    assert!(engine.sync_stats().await);

    let pushes = stub.stats_pushes.lock();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["totalWords"], 100);
    assert_eq!(pushes[0]["totalTranscriptions"], 2);
    assert_eq!(pushes[0]["totalDuration"], 40.0);
    assert_eq!(pushes[0]["device"], "desktop");
}

#[tokio::test]
async fn fetch_stats_reports_discrepancy_without_overwriting() {
    let (_stub, address) = spawn_stub(RecordMode::Accept, 150).await;
    let store = Arc::new(LocalStore::in_memory().unwrap());
    store.record_event(100, 60.0).unwrap();

    let engine = engine_for(&store, &address);
    let remote = engine.fetch_stats().await.expect("remote stats");
    assert_eq!(remote.total_words, 150);

    let local = store.stats().unwrap();
    assert_eq!(remote.words_ahead_of(&local), Some(50));
    // The pull is informational only: local counters stay where they were.
    assert_eq!(local.total_words, 100);
}
