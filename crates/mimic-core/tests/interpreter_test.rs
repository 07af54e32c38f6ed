use mimic_common::knowledge::PlanStep;
use mimic_core::backend::Backend;
use mimic_core::config::ReplayConfig;
use mimic_core::interpreter::{CommandInterpreter, ReplayEvent};
use mimic_core::protocol::{Point, SyntheticEvent};
use mimic_core::virtual_backend::{VirtualBackend, VirtualFixture};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const FIXTURE: &str = r#"
title: Notes
apps: [notes]
elements:
  - id: 1
    type: input
    placeholder: Title
    selector: "form#note > input.title"
    rect: { x: 10, y: 10, width: 200, height: 24 }
  - id: 2
    type: button
    text: Save
    selector: "form#note > button.primary"
    rect: { x: 10, y: 50, width: 80, height: 24 }
  - id: 3
    type: div
    text: Hidden helper
    rect: { x: 0, y: 0, width: 0, height: 0 }
"#;

async fn backend() -> VirtualBackend {
    let mut backend = VirtualBackend::from_fixture(VirtualFixture::from_yaml(FIXTURE).unwrap());
    backend.launch().await.unwrap();
    backend
}

fn commands(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

fn interpreter() -> CommandInterpreter {
    CommandInterpreter::new(ReplayConfig::instant())
}

#[tokio::test]
async fn test_unresolved_focus_is_skipped_and_replay_continues() {
    let mut backend = backend().await;
    let mut interpreter = interpreter();

    let report = interpreter
        .execute(
            &mut backend,
            &commands(&["FOCUS_ELEMENT:Nothing like this", "FOCUS_ELEMENT:Title", "TYPE:hello"]),
        )
        .await;

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 0);
    assert_eq!(report.executed, 2);
    assert!(!report.success());
    assert_eq!(backend.value_of(1), Some("hello"));
}

#[tokio::test]
async fn test_zero_area_elements_never_resolve() {
    let mut backend = backend().await;
    let report = interpreter()
        .execute(&mut backend, &commands(&["CLICK:Hidden helper"]))
        .await;
    assert_eq!(report.skipped.len(), 1);
}

#[tokio::test]
async fn test_typing_finishes_before_next_command() {
    let mut backend = backend().await;
    let config = ReplayConfig {
        type_delay_ms: 5,
        ..ReplayConfig::instant()
    };
    let mut interpreter = CommandInterpreter::new(config);

    let report = interpreter
        .execute(
            &mut backend,
            &commands(&["CLICK:Title", "TYPE:ab", "PRESS_KEY:Enter"]),
        )
        .await;
    assert!(report.success());

    let keys: Vec<String> = backend
        .dispatched()
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::KeyDown { key, .. } => Some(format!("down {}", key)),
            SyntheticEvent::Input { text, .. } => Some(format!("input {}", text)),
            SyntheticEvent::KeyUp { key, .. } => Some(format!("up {}", key)),
            _ => None,
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            "down a", "input a", "up a", "down b", "input b", "up b", "down Enter", "up Enter"
        ]
    );
    assert_eq!(backend.value_of(1), Some("ab"));
}

#[tokio::test]
async fn test_drag_interpolates_between_points() {
    let mut backend = backend().await;
    let config = ReplayConfig {
        drag_steps: 4,
        ..ReplayConfig::instant()
    };
    let mut interpreter = CommandInterpreter::new(config);

    interpreter
        .execute(&mut backend, &commands(&["DRAG:0:0:100:40"]))
        .await;

    let events = backend.dispatched();
    let moves: Vec<Point> = events
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::PointerMove { at } => Some(*at),
            _ => None,
        })
        .collect();
    assert_eq!(moves.len(), 5);
    assert_eq!(moves[1], Point::new(25.0, 10.0));
    assert!(matches!(events.first(), Some(SyntheticEvent::PointerMove { .. })));
    assert!(matches!(events[1], SyntheticEvent::PointerDown { .. }));
    assert!(matches!(
        events.last(),
        Some(SyntheticEvent::PointerUp { at, .. }) if *at == Point::new(100.0, 40.0)
    ));
    assert_eq!(interpreter.cursor(), Point::new(100.0, 40.0));
}

#[tokio::test]
async fn test_point_click_hits_element_under_pointer() {
    let mut backend = backend().await;
    interpreter()
        .execute(&mut backend, &commands(&["CLICK:50:62"]))
        .await;

    assert!(backend.dispatched().iter().any(|e| matches!(
        e,
        SyntheticEvent::Click {
            target: Some(2),
            click_count: 1,
            ..
        }
    )));
}

#[tokio::test]
async fn test_double_and_right_click() {
    let mut backend = backend().await;
    interpreter()
        .execute(
            &mut backend,
            &commands(&["DOUBLE_CLICK:text=Save", "RIGHT_CLICK:Save"]),
        )
        .await;

    let events = backend.dispatched();
    assert!(events.iter().any(|e| matches!(
        e,
        SyntheticEvent::Click {
            click_count: 2,
            target: Some(2),
            ..
        }
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SyntheticEvent::ContextMenu { target: Some(2), .. }))
    );
}

#[tokio::test]
async fn test_scroll_uses_cursor_by_default() {
    let mut backend = backend().await;
    let report = interpreter()
        .execute(
            &mut backend,
            &commands(&["MOUSE_MOVE:30:20", "SCROLL:down:120", "SCROLL:left:15:5:5"]),
        )
        .await;
    assert!(report.success());
    assert_eq!(backend.scroll_offset(), Point::new(-15.0, 120.0));
    assert!(backend.dispatched().iter().any(|e| matches!(
        e,
        SyntheticEvent::Wheel { at, target: Some(1), .. } if *at == Point::new(30.0, 20.0)
    )));
}

#[tokio::test]
async fn test_key_combo_holds_modifiers() {
    let mut backend = backend().await;
    interpreter()
        .execute(&mut backend, &commands(&["KEY_COMBO:ctrl+shift+s"]))
        .await;

    let sequence: Vec<(bool, String)> = backend
        .dispatched()
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::KeyDown { key, .. } => Some((true, key.clone())),
            SyntheticEvent::KeyUp { key, .. } => Some((false, key.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        sequence,
        vec![
            (true, "Control".to_string()),
            (true, "Shift".to_string()),
            (true, "s".to_string()),
            (false, "s".to_string()),
            (false, "Shift".to_string()),
            (false, "Control".to_string()),
        ]
    );
    // Modified keys do not insert text.
    assert!(
        !backend
            .dispatched()
            .iter()
            .any(|e| matches!(e, SyntheticEvent::Input { .. }))
    );
}

#[tokio::test]
async fn test_backspace_edits_focused_field() {
    let mut backend = backend().await;
    interpreter()
        .execute(
            &mut backend,
            &commands(&["FOCUS_ELEMENT:Title", "TYPE:draft", "BACKSPACE:2"]),
        )
        .await;
    assert_eq!(backend.value_of(1), Some("dra"));
}

#[tokio::test]
async fn test_window_commands_reach_window_manager() {
    let mut backend = backend().await;
    let report = interpreter()
        .execute(
            &mut backend,
            &commands(&["OPEN_APP:notes", "MOVE_WINDOW:notes-1:300:200", "FOCUS_WINDOW:notes-1"]),
        )
        .await;
    assert!(report.success());
    assert_eq!(backend.windows().len(), 1);
    assert_eq!(backend.windows()[0].position, Point::new(300.0, 200.0));

    let report = interpreter()
        .execute(
            &mut backend,
            &commands(&["CLOSE_WINDOW:notes-1", "CLOSE_WINDOW:notes-1", "OPEN_APP:browser"]),
        )
        .await;
    assert_eq!(report.executed, 1);
    assert_eq!(report.skipped.len(), 2);
    assert!(backend.windows().is_empty());
}

#[tokio::test]
async fn test_finished_ends_the_plan() {
    let mut backend = backend().await;
    let report = interpreter()
        .execute(&mut backend, &commands(&["WAIT:1", "FINISHED", "OPEN_APP:notes"]))
        .await;
    assert!(report.finished);
    assert_eq!(report.executed, 2);
    assert!(backend.windows().is_empty());
}

#[tokio::test]
async fn test_unknown_verbs_are_skipped() {
    let mut backend = backend().await;
    let report = interpreter()
        .execute(&mut backend, &commands(&["KEYBOARD_INPUT", "FOCUS_ELEMENT:Title"]))
        .await;
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(backend.focused(), Some(1));
}

#[tokio::test]
async fn test_plan_step_falls_back() {
    let mut backend = backend().await;
    let steps = vec![
        PlanStep {
            command: "CLICK:text=Publish".into(),
            fallbacks: vec!["CLICK:text=Nowhere".into(), "CLICK:near=50,62".into()],
        },
        PlanStep::new("CLICK:text=Gone"),
    ];

    let report = interpreter().execute_plan(&mut backend, &steps).await;
    assert_eq!(report.executed, 1);
    assert_eq!(report.fallbacks_used, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].command, "CLICK:text=Gone");
    assert!(backend.dispatched().iter().any(|e| matches!(
        e,
        SyntheticEvent::Click {
            target: Some(2),
            ..
        }
    )));
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let mut backend = backend().await;
    let token = CancellationToken::new();
    token.cancel();
    let mut interpreter = interpreter().with_cancellation(token);

    let report = interpreter
        .execute(&mut backend, &commands(&["FOCUS_ELEMENT:Title"]))
        .await;
    assert!(report.cancelled);
    assert_eq!(report.executed, 0);
    assert!(backend.dispatched().is_empty());
}

#[tokio::test]
async fn test_cancel_interrupts_wait() {
    let mut backend = backend().await;
    let token = CancellationToken::new();
    let mut interpreter = interpreter().with_cancellation(token.clone());
    let plan = commands(&["WAIT:10000", "FOCUS_ELEMENT:Title"]);

    let started = Instant::now();
    let (report, _) = tokio::join!(interpreter.execute(&mut backend, &plan), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    assert!(report.cancelled);
    assert_eq!(report.executed, 0);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(backend.focused(), None);
}

#[tokio::test]
async fn test_progress_events_are_emitted() {
    let mut backend = backend().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut interpreter = interpreter().with_events(tx);

    interpreter
        .execute(&mut backend, &commands(&["MOUSE_MOVE:12:34"]))
        .await;
    drop(interpreter);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(&events[0], ReplayEvent::Log(line) if line.contains("MOUSE_MOVE")));
    assert!(events.contains(&ReplayEvent::Cursor(Point::new(12.0, 34.0))));
}
