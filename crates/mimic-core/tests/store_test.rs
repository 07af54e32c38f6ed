use chrono::Utc;
use mimic_common::knowledge::{
    BehaviorPatch, BehaviorStatistics, KNOWLEDGE_SCHEMA_VERSION, KnowledgeRecord, PlanStep,
};
use mimic_core::store::crypto::Envelope;
use mimic_core::store::{DeviceFingerprint, FileKvStore, KeyValueStore, KnowledgeStore, MemoryKvStore};
use std::sync::Arc;

const ITERATIONS: u32 = 16;

fn fingerprint() -> DeviceFingerprint {
    DeviceFingerprint::new("linux-x86_64", "1920x1080", "en_US.UTF-8")
}

fn open(kv: Arc<MemoryKvStore>, secret: &str, fingerprint: &DeviceFingerprint) -> KnowledgeStore {
    KnowledgeStore::open_with(kv, secret, fingerprint, ITERATIONS)
}

fn record(id: &str, name: &str, confidence: f64) -> KnowledgeRecord {
    KnowledgeRecord {
        id: id.to_string(),
        version: KNOWLEDGE_SCHEMA_VERSION,
        name: name.to_string(),
        description: format!("Task: {}", name),
        category: "learned".to_string(),
        decision_tree: vec![PlanStep {
            command: "CLICK:text=Save".into(),
            fallbacks: vec!["CLICK:tag=button".into()],
        }],
        raw_observations: Vec::new(),
        statistics: BehaviorStatistics::default(),
        confidence,
        last_tested: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_save_then_load_round_trips() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv.clone(), "secret", &fingerprint());
    let records = vec![record("a", "rename file", 0.8), record("b", "save note", 0.9)];

    store.save(&records).await.unwrap();
    assert_eq!(store.load().await, records);

    // Only the envelope is stored, under one opaque key.
    let keys = kv.keys().await;
    assert_eq!(keys, vec![store.key_name().to_string()]);
    let raw = kv.get(&keys[0]).await.unwrap().unwrap();
    assert!(!raw.contains("rename file"));
    let envelope: Envelope = serde_json::from_str(&raw).unwrap();
    assert_eq!(envelope.schema_version, KNOWLEDGE_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_other_fingerprint_wipes_entry() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv.clone(), "secret", &fingerprint());
    store.save(&[record("a", "rename file", 0.8)]).await.unwrap();

    let elsewhere = DeviceFingerprint::new("linux-x86_64", "1280x720", "en_US.UTF-8");
    let foreign = open(kv.clone(), "secret", &elsewhere);
    assert!(foreign.load().await.is_empty());
    assert!(kv.keys().await.is_empty());
    assert!(store.load().await.is_empty());
}

#[tokio::test]
async fn test_other_secret_wipes_entry() {
    let kv = Arc::new(MemoryKvStore::new());
    open(kv.clone(), "secret", &fingerprint())
        .save(&[record("a", "x", 0.8)])
        .await
        .unwrap();

    assert!(open(kv.clone(), "guess", &fingerprint()).load().await.is_empty());
    assert!(kv.keys().await.is_empty());
}

#[tokio::test]
async fn test_corrupted_envelope_wipes_entry() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv.clone(), "secret", &fingerprint());
    store.save(&[record("a", "x", 0.8)]).await.unwrap();

    kv.set(store.key_name(), "{not json".into()).await.unwrap();
    assert!(store.load().await.is_empty());
    assert!(kv.keys().await.is_empty());
}

#[tokio::test]
async fn test_find_matching_orders_by_confidence() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv, "secret", &fingerprint());
    store.add_behavior(record("1", "rename file", 0.75)).await.unwrap();
    store.add_behavior(record("2", "rename folder", 0.9)).await.unwrap();
    store.add_behavior(record("3", "open settings", 0.95)).await.unwrap();

    let found = store.find_matching("Rename the file").await;
    let ids: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);

    let all = store.find_matching("").await;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, "3");
}

#[tokio::test]
async fn test_add_replaces_same_id() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv, "secret", &fingerprint());
    store.add_behavior(record("1", "old", 0.8)).await.unwrap();
    store.add_behavior(record("1", "new", 0.8)).await.unwrap();

    let records = store.load().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "new");
}

#[tokio::test]
async fn test_update_and_remove() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv, "secret", &fingerprint());
    store.add_behavior(record("1", "rename file", 0.8)).await.unwrap();

    let patch = BehaviorPatch {
        name: Some("rename document".into()),
        confidence: Some(1.5),
        ..Default::default()
    };
    let updated = store.update_behavior("1", patch).await.unwrap().unwrap();
    assert_eq!(updated.name, "rename document");
    assert_eq!(updated.confidence, 1.0);
    assert!(
        store
            .update_behavior("missing", BehaviorPatch::default())
            .await
            .unwrap()
            .is_none()
    );

    assert!(store.remove_behavior("1").await.unwrap());
    assert!(!store.remove_behavior("1").await.unwrap());
    assert!(store.get("1").await.is_none());
}

#[tokio::test]
async fn test_record_execution_updates_statistics() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv, "secret", &fingerprint());
    store.add_behavior(record("1", "rename file", 0.8)).await.unwrap();

    store.record_execution("1", true, 100, None).await.unwrap();
    let after = store
        .record_execution("1", false, 300, Some("CLICK:text=Save: no match".into()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after.statistics.times_executed, 2);
    assert!((after.statistics.success_rate - 0.5).abs() < 1e-9);
    assert!((after.statistics.avg_execution_time_ms - 200.0).abs() < 1e-9);
    assert!(after.statistics.last_failure_reason.is_some());
    assert!(after.last_tested.is_some());
    assert_eq!(after.confidence, 0.8);
}

#[tokio::test]
async fn test_wipe_clears_everything() {
    let kv = Arc::new(MemoryKvStore::new());
    let store = open(kv.clone(), "secret", &fingerprint());
    store.add_behavior(record("1", "a", 0.8)).await.unwrap();
    store.wipe().await.unwrap();
    assert!(store.load().await.is_empty());
    assert!(kv.keys().await.is_empty());
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge.json");
    let records = vec![record("1", "rename file", 0.8)];

    let store = KnowledgeStore::open_with(
        Arc::new(FileKvStore::new(path.clone())),
        "secret",
        &fingerprint(),
        ITERATIONS,
    );
    store.save(&records).await.unwrap();
    store.close();

    let reopened = KnowledgeStore::open_with(
        Arc::new(FileKvStore::new(path)),
        "secret",
        &fingerprint(),
        ITERATIONS,
    );
    assert_eq!(reopened.load().await, records);
}
