//! Tests for vritual-store: arbiter semantics, corruption, contention, logs, guard

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vritual_core::{Error, LoopRecord, MemoryDocument};
use vritual_store::{load_document, MemoryGuard, RollingLog, StateStore, StoreConfig};

fn doc_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("loopmemory.json")
}

// ===========================================================================
// Loading
// ===========================================================================

#[tokio::test]
async fn missing_document_opens_as_skeleton() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();
    assert_eq!(*store.snapshot(), MemoryDocument::default());
}

#[tokio::test]
async fn corrupt_document_is_surfaced_not_repaired() {
    let dir = TempDir::new().unwrap();
    let path = doc_path(&dir);
    std::fs::write(&path, "{ \"loops\": { broken").unwrap();

    let err = StateStore::open(StoreConfig::new(&path)).await.err().unwrap();
    assert!(matches!(err, Error::CorruptState { .. }));
    // The broken bytes are still there.
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "{ \"loops\": { broken"
    );
}

#[tokio::test]
async fn existing_document_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = doc_path(&dir);
    std::fs::write(
        &path,
        r#"{"loops": {"hi": {"count": 2, "loop_energy": 0.6}}, "rituals": []}"#,
    )
    .unwrap();

    let store = StateStore::open(StoreConfig::new(&path)).await.unwrap();
    let count = store.read(|doc| doc.loops["hi"].count);
    assert_eq!(count, 2);
}

#[tokio::test]
async fn document_from_naive_timestamp_writer_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = doc_path(&dir);
    std::fs::write(
        &path,
        r#"{
  "rituals": [
    {
      "name": "sacred_mirror",
      "trigger": "mirror",
      "effect": "glow",
      "importance": "sacred",
      "usage_count": 4,
      "last_triggered": "2024-05-01T09:59:00.654321"
    },
    {
      "name": "dawn",
      "trigger": {"hour": 7},
      "effect": "wake",
      "importance": "daily",
      "usage_count": 0,
      "last_triggered": null
    }
  ],
  "loops": {
    "good morning": {
      "count": 3,
      "last_used": "2024-05-01T10:00:00.123456",
      "importance": "low",
      "loop_energy": 0.9,
      "ritualized": true
    }
  },
  "reactions": [
    {
      "emotion": "joy",
      "emoji": "✨",
      "face": "(^‿^)",
      "timestamp": "2024-05-01T10:00:01.000001",
      "source": "sacred_mirror",
      "mood_score": {"joy": 1}
    }
  ],
  "system_state": {
    "mood_score": {"joy": 1.0},
    "attention": {
      "timestamp": "2024-05-01T10:05:00.000001",
      "last_phrase": null,
      "last_phrase_time": "never",
      "seconds_since_last_phrase": null,
      "loop_count": 0,
      "attention_state": "idle"
    },
    "environment": {
      "light_level": "dim",
      "sound_level": "normal",
      "temperature": "comfortable",
      "last_update": "2024-05-01T10:04:00.5"
    },
    "current_mission": {
      "title": "Rest",
      "goal": "Be quiet",
      "assigned_at": "2024-05-01T08:00:00",
      "success_conditions": [],
      "emotion_bias": ["calm"],
      "status": "active"
    },
    "mission_history": [],
    "last_loaded_identity": "viria",
    "identity_loaded_at": "2024-05-01T07:00:00.000002"
  }
}"#,
    )
    .unwrap();

    let store = StateStore::open(StoreConfig::new(&path)).await.unwrap();
    let doc = store.snapshot();
    assert!(doc.loops["good morning"].last_used.is_some());
    assert!(doc.rituals[0].last_triggered.is_some());
    assert_eq!(doc.reactions[0].emoji.as_deref(), Some("✨"));
    let attention = doc.system_state.attention.as_ref().unwrap();
    assert!(attention.last_phrase_time.is_none());
    assert_eq!(doc.system_state.current_mission.as_ref().unwrap().title, "Rest");

    // A write keeps everything, now with explicit offsets.
    store
        .transact(|doc| {
            doc.system_state.mood_score.insert("calm".into(), 0.5);
        })
        .await
        .unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw["loops"]["good morning"]["last_used"]
        .as_str()
        .unwrap()
        .ends_with('Z'));
    assert_eq!(raw["reactions"][0]["face"], "(^‿^)");
    let reloaded = load_document(&path).await.unwrap();
    assert_eq!(reloaded, *store.snapshot());
}

// ===========================================================================
// Serialized writers
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_do_not_lose_updates() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .transact(move |doc| {
                        doc.loops.insert(format!("phrase-{i}"), LoopRecord::default());
                    })
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.read(|doc| doc.loops.len()), 32);
    let on_disk = load_document(store.path()).await.unwrap();
    assert_eq!(on_disk.loops.len(), 32);
}

#[tokio::test]
async fn transaction_result_is_returned() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();
    let count = store
        .transact(|doc| {
            let entry = doc.loops.entry("x".into()).or_default();
            entry.count += 1;
            entry.count
        })
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn subscribers_see_commits() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();
    let mut rx = store.subscribe();

    store
        .transact(|doc| {
            doc.system_state.mood_score.insert("joy".into(), 1.0);
        })
        .await
        .unwrap();

    rx.changed().await.unwrap();
    assert!(rx.borrow().system_state.mood_score.contains_key("joy"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn contention_fails_with_store_busy() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::new(doc_path(&dir));
    config.acquire_timeout = Duration::from_millis(50);
    config.queue_depth = 1;
    let store = StateStore::open(config).await.unwrap();

    // Occupy the arbiter.
    let slow = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .transact(|doc| {
                    std::thread::sleep(Duration::from_millis(400));
                    doc.loops.insert("slow".into(), LoopRecord::default());
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Fills the single queue slot, then expires before the arbiter reaches it.
    let queued = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .transact(|doc| {
                    doc.loops.insert("queued".into(), LoopRecord::default());
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // No room in the queue at all.
    let rejected = store
        .transact(|doc| {
            doc.loops.insert("rejected".into(), LoopRecord::default());
        })
        .await;
    assert!(matches!(rejected, Err(Error::StoreBusy(_))));

    slow.await.unwrap().unwrap();
    let queued = queued.await.unwrap();
    assert!(matches!(queued, Err(Error::StoreBusy(_))));

    // A later transaction runs after the abandoned one would have.
    store
        .transact(|doc| {
            doc.loops.insert("after".into(), LoopRecord::default());
        })
        .await
        .unwrap();
    let keys: Vec<String> = store.read(|doc| doc.loops.keys().cloned().collect());
    assert_eq!(keys, vec!["after".to_string(), "slow".to_string()]);
    let on_disk = load_document(store.path()).await.unwrap();
    assert!(!on_disk.loops.contains_key("queued"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn started_transaction_outlives_the_acquire_window() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::new(doc_path(&dir));
    config.acquire_timeout = Duration::from_millis(50);
    let store = StateStore::open(config).await.unwrap();

    let count = store
        .transact(|doc| {
            std::thread::sleep(Duration::from_millis(200));
            let entry = doc.loops.entry("slow".into()).or_default();
            entry.count += 1;
            entry.count
        })
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(load_document(store.path()).await.unwrap().loops["slow"].count, 1);
}

#[tokio::test]
async fn slow_persist_still_commits_and_matches_disk() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::new(doc_path(&dir));
    config.io_timeout = Duration::ZERO;
    let store = StateStore::open(config).await.unwrap();

    for i in 0..3 {
        store
            .transact(move |doc| {
                doc.loops.insert(format!("p{i}"), LoopRecord::default());
            })
            .await
            .unwrap();
    }
    let on_disk = load_document(store.path()).await.unwrap();
    assert_eq!(on_disk, *store.snapshot());
    assert_eq!(on_disk.loops.len(), 3);
}

// ===========================================================================
// Process lock
// ===========================================================================

#[tokio::test]
async fn second_store_on_same_document_is_busy() {
    let dir = TempDir::new().unwrap();
    let first = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();

    let mut config = StoreConfig::new(doc_path(&dir));
    config.acquire_timeout = Duration::from_millis(100);
    let started = std::time::Instant::now();
    let err = StateStore::open(config).await.err().unwrap();
    assert!(matches!(err, Error::StoreBusy(_)));
    assert!(started.elapsed() < Duration::from_secs(2));

    // The holder keeps working.
    first
        .transact(|doc| {
            doc.loops.insert("mine".into(), LoopRecord::default());
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn lock_is_released_when_the_store_is_dropped() {
    let dir = TempDir::new().unwrap();
    {
        let store = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();
        store
            .transact(|doc| {
                doc.loops.insert("kept".into(), LoopRecord::default());
            })
            .await
            .unwrap();
    }
    let reopened = StateStore::open(StoreConfig::new(doc_path(&dir))).await.unwrap();
    assert!(reopened.read(|doc| doc.loops.contains_key("kept")));
}

// ===========================================================================
// Rolling logs
// ===========================================================================

#[tokio::test]
async fn rolling_log_caps_and_orders() {
    let dir = TempDir::new().unwrap();
    let log: RollingLog<serde_json::Value> = RollingLog::new(dir.path().join("attention_log.json"), 100);
    for i in 0..120 {
        log.append(&serde_json::json!({ "n": i })).await.unwrap();
    }
    let entries = log.entries().await.unwrap();
    assert_eq!(entries.len(), 100);
    assert_eq!(entries[0]["n"], 20);
    assert_eq!(entries[99]["n"], 119);
}

#[tokio::test]
async fn rolling_log_concurrent_appends_all_land() {
    let dir = TempDir::new().unwrap();
    let log: Arc<RollingLog<u32>> = Arc::new(RollingLog::new(dir.path().join("log.json"), 50));
    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let log = log.clone();
            tokio::spawn(async move { log.append(&i).await })
        })
        .collect();
    for r in futures::future::join_all(tasks).await {
        r.unwrap().unwrap();
    }
    let mut entries = log.entries().await.unwrap();
    entries.sort();
    assert_eq!(entries, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn corrupt_log_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("heartbeat_log.json");
    std::fs::write(&path, "not json").unwrap();
    let log: RollingLog<u32> = RollingLog::new(&path, 10);
    assert!(matches!(log.append(&1).await, Err(Error::CorruptState { .. })));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
}

// ===========================================================================
// MemoryGuard
// ===========================================================================

#[tokio::test]
async fn guard_snapshot_and_drift() {
    let dir = TempDir::new().unwrap();
    let path = doc_path(&dir);
    let guard = MemoryGuard::new(&path, dir.path().join("loopmemory_snapshot.json"));

    // Nothing to snapshot yet.
    assert!(!guard.save_snapshot().await.unwrap());

    let store = StateStore::open(StoreConfig::new(&path)).await.unwrap();
    store
        .transact(|doc| {
            doc.loops.insert("a".into(), LoopRecord::default());
        })
        .await
        .unwrap();

    assert!(guard.save_snapshot().await.unwrap());
    assert!(guard.drift().await.unwrap().is_empty());

    store
        .transact(|doc| {
            doc.system_state.mood_score.insert("joy".into(), 1.0);
        })
        .await
        .unwrap();
    assert_eq!(guard.drift().await.unwrap(), vec!["system_state"]);
}

#[tokio::test]
async fn guard_refuses_to_snapshot_corruption() {
    let dir = TempDir::new().unwrap();
    let path = doc_path(&dir);
    std::fs::write(&path, "[[[").unwrap();
    let guard = MemoryGuard::new(&path, dir.path().join("snap.json"));

    assert!(matches!(guard.validate().await, Err(Error::CorruptState { .. })));
    assert!(guard.save_snapshot().await.is_err());
    assert!(!guard.snapshot_path().exists());
}
