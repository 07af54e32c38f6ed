use mimic_common::action::{ObservationSession, RawAction};
use mimic_core::backend::Backend;
use mimic_core::config::{RecorderConfig, ReplayConfig};
use mimic_core::interpreter::CommandInterpreter;
use mimic_core::learner::{PatternAnalyzer, SessionLog};
use mimic_core::protocol::{MouseButton, SyntheticEvent};
use mimic_core::recorder::{EventBus, EventTarget, HostEvent, Recorder};
use mimic_core::store::{DeviceFingerprint, KnowledgeStore, MemoryKvStore};
use mimic_core::virtual_backend::{VirtualBackend, VirtualFixture};
use std::sync::Arc;

const FIXTURE: &str = r#"
title: Files
elements:
  - id: 1
    type: button
    text: Rename
    rect: { x: 600, y: 40, width: 90, height: 28 }
  - id: 2
    type: input
    placeholder: New name
    rect: { x: 200, y: 120, width: 300, height: 28 }
"#;

fn demonstrate(bus: &EventBus, rename_at: (f64, f64), name: &str) {
    bus.dispatch(&HostEvent::Click {
        x: rename_at.0,
        y: rename_at.1,
        button: MouseButton::Left,
        click_count: 1,
        target: Some(EventTarget {
            tag: "button".into(),
            text: "Rename".into(),
            ..Default::default()
        }),
    });
    for key in name.chars() {
        bus.dispatch(&HostEvent::KeyDown {
            key: key.to_string(),
            target: None,
        });
    }
    bus.dispatch(&HostEvent::KeyDown {
        key: "Enter".into(),
        target: None,
    });
}

#[tokio::test]
async fn test_learned_behavior_replays_invariant_steps() {
    let bus = EventBus::new();
    let mut recorder = Recorder::new(bus.clone(), RecorderConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let log = SessionLog::new(dir.path().to_path_buf());

    for (attempt, (at, name)) in [((640.0, 50.0), "ab"), ((300.0, 400.0), "xy")]
        .into_iter()
        .enumerate()
    {
        recorder.start("rename file", attempt as u32 + 1).unwrap();
        demonstrate(&bus, at, name);
        log.save(&recorder.stop().unwrap()).await.unwrap();
    }

    let sessions = log.load_task("rename file").await.unwrap();
    assert_eq!(sessions.len(), 2);

    let analyzer = PatternAnalyzer::default();
    let pattern = analyzer.analyze(&sessions).unwrap();
    // Click and Enter are shared; the typed name is user input.
    assert_eq!(pattern.command_sequence, vec!["CLICK:text=Rename", "PRESS_KEY:Enter"]);
    assert_eq!(pattern.variants.len(), 2);

    let store = KnowledgeStore::open_with(
        Arc::new(MemoryKvStore::new()),
        "secret",
        &DeviceFingerprint::new("test", "800x600", "C"),
        16,
    );
    let record = analyzer.to_knowledge_record(&pattern, &sessions);
    store.add_behavior(record.clone()).await.unwrap();

    let behavior = store.find_matching("rename").await.remove(0);
    let mut backend = VirtualBackend::from_fixture(VirtualFixture::from_yaml(FIXTURE).unwrap());
    backend.launch().await.unwrap();
    let report = CommandInterpreter::new(ReplayConfig::instant())
        .execute_plan(&mut backend, &behavior.decision_tree)
        .await;
    assert!(report.success());
    assert!(backend.dispatched().iter().any(|e| matches!(
        e,
        SyntheticEvent::Click {
            target: Some(1),
            ..
        }
    )));

    let updated = store
        .record_execution(&behavior.id, report.success(), report.duration_ms, report.failure_reason())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.statistics.times_executed, 1);
    assert_eq!(updated.statistics.success_rate, 1.0);
}

#[tokio::test]
async fn test_learned_spaces_survive_replay() {
    let sessions: Vec<ObservationSession> = (1..=2)
        .map(|attempt| {
            let mut session = ObservationSession::new("type name", attempt);
            session.actions = ["a", " ", "b"]
                .iter()
                .enumerate()
                .map(|(i, key)| RawAction::key(i as u64 * 100, key))
                .collect();
            session
        })
        .collect();

    let pattern = PatternAnalyzer::default().analyze(&sessions).unwrap();
    assert_eq!(pattern.command_sequence, vec!["TYPE:a", "TYPE: ", "TYPE:b"]);

    let mut backend = VirtualBackend::from_fixture(VirtualFixture::from_yaml(FIXTURE).unwrap());
    backend.launch().await.unwrap();
    backend.focus(2).await.unwrap();
    let report = CommandInterpreter::new(ReplayConfig::instant())
        .execute(&mut backend, &pattern.command_sequence)
        .await;
    assert!(report.success());
    assert_eq!(backend.value_of(2), Some("a b"));
}
