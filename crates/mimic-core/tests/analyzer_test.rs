use chrono::Utc;
use mimic_common::action::{ElementDescriptor, ObservationSession, RawAction};
use mimic_common::knowledge::CONFIDENCE_CEILING;
use mimic_common::pattern::{SampledValue, VariationKind};
use mimic_core::learner::{AnalysisError, PatternAnalyzer};
use mimic_core::protocol::Point;
use std::collections::HashMap;

fn target(tag: &str, text: &str) -> Option<ElementDescriptor> {
    Some(ElementDescriptor::new(tag, None, &[], text, &HashMap::new(), 50))
}

fn session(task: &str, attempt: u32, actions: Vec<RawAction>) -> ObservationSession {
    let mut session = ObservationSession::new(task, attempt);
    session.actions = actions;
    session.end_time = Some(Utc::now());
    session
}

#[test]
fn test_no_sessions_is_insufficient_data() {
    let analyzer = PatternAnalyzer::default();
    assert_eq!(analyzer.analyze(&[]), Err(AnalysisError::InsufficientData));
}

#[test]
fn test_mixed_tasks_are_rejected() {
    let analyzer = PatternAnalyzer::default();
    let sessions = [
        session("a", 1, vec![RawAction::key(0, "x")]),
        session("b", 1, vec![RawAction::key(0, "x")]),
    ];
    assert!(matches!(
        analyzer.analyze(&sessions),
        Err(AnalysisError::MixedTasks { .. })
    ));
}

#[test]
fn test_single_session_has_no_variants() {
    let analyzer = PatternAnalyzer::default();
    let sessions = [session(
        "save",
        1,
        vec![
            RawAction::pointer(0, 40.0, 60.0, target("button", "Save")),
            RawAction::pointer(300, 700.0, 20.0, None),
            RawAction::key(500, "Enter"),
            RawAction::wheel(900, 240.0, 10.0, 10.0),
        ],
    )];

    let pattern = analyzer.analyze(&sessions).unwrap();
    assert!(pattern.variants.is_empty());
    assert_eq!(pattern.invariants.len(), 4);
    assert_eq!(
        pattern.command_sequence,
        vec![
            "CLICK:text=Save",
            "CLICK:700:20",
            "PRESS_KEY:Enter",
            "SCROLL:down:240:10:10"
        ]
    );
}

#[test]
fn test_same_text_click_is_invariant_regardless_of_position() {
    let analyzer = PatternAnalyzer::default();
    let sessions: Vec<_> = [(40.0, 60.0), (400.0, 300.0), (900.0, 20.0)]
        .iter()
        .enumerate()
        .map(|(i, (x, y))| {
            session(
                "save",
                i as u32 + 1,
                vec![RawAction::pointer(0, *x, *y, target("button", "Save"))],
            )
        })
        .collect();

    let pattern = analyzer.analyze(&sessions).unwrap();
    assert!(pattern.is_invariant(0));
    assert_eq!(pattern.command_sequence, vec!["CLICK:text=Save"]);

    let fallback = pattern.fallback_for(0).unwrap();
    assert_eq!(fallback.primary_strategy, "CLICK:text=Save");
    assert!(
        fallback
            .fallback_strategies
            .contains(&"CLICK:tag=button".to_string())
    );
}

#[test]
fn test_scattered_clicks_are_a_position_variant() {
    let analyzer = PatternAnalyzer::default();
    let sessions: Vec<_> = [(100.0, 100.0), (520.0, 300.0), (10.0, 900.0)]
        .iter()
        .enumerate()
        .map(|(i, (x, y))| session("pick", i as u32 + 1, vec![RawAction::pointer(0, *x, *y, None)]))
        .collect();

    let pattern = analyzer.analyze(&sessions).unwrap();
    assert!(pattern.is_variant(0));
    assert!(pattern.command_sequence.is_empty());

    let variant = &pattern.variants[0];
    assert_eq!(variant.variation_kind, VariationKind::Position);
    assert_eq!(variant.sampled_values.len(), 3);
    match variant.average {
        Some(SampledValue::Point(p)) => {
            assert!((p.x - 210.0).abs() < 1e-9);
            assert!((p.y - 1300.0 / 3.0).abs() < 1e-9);
        }
        ref other => panic!("expected point average, got {:?}", other),
    }
}

#[test]
fn test_tight_cluster_replays_at_centroid() {
    let analyzer = PatternAnalyzer::default();
    let sessions: Vec<_> = [Point::new(100.0, 200.0), Point::new(110.0, 190.0)]
        .iter()
        .enumerate()
        .map(|(i, p)| session("tap", i as u32 + 1, vec![RawAction::pointer(0, p.x, p.y, None)]))
        .collect();

    let pattern = analyzer.analyze(&sessions).unwrap();
    assert_eq!(pattern.command_sequence, vec!["CLICK:105:195"]);
    assert_eq!(
        pattern.fallback_for(0).unwrap().fallback_strategies,
        vec!["CLICK:near=105,195;radius=150"]
    );
}

#[test]
fn test_differing_keys_are_a_choice() {
    let analyzer = PatternAnalyzer::default();
    let sessions = [
        session("name", 1, vec![RawAction::key(0, "a")]),
        session("name", 2, vec![RawAction::key(0, "b")]),
    ];
    let pattern = analyzer.analyze(&sessions).unwrap();
    assert_eq!(pattern.variants[0].variation_kind, VariationKind::Choice);
    assert!(pattern.command_sequence.is_empty());
}

#[test]
fn test_text_against_plain_key_is_a_choice() {
    let analyzer = PatternAnalyzer::default();
    let sessions = [
        session("name", 1, vec![RawAction::key(0, "a")]),
        session("name", 2, vec![RawAction::key(0, "Enter")]),
    ];
    let pattern = analyzer.analyze(&sessions).unwrap();
    assert!(pattern.invariants.is_empty());
    assert_eq!(pattern.variants.len(), 1);
    assert_eq!(pattern.variants[0].variation_kind, VariationKind::Choice);
    assert_eq!(
        pattern.variants[0].sampled_values,
        vec![
            SampledValue::Text("a".into()),
            SampledValue::Text("Enter".into())
        ]
    );
    assert!(pattern.command_sequence.is_empty());
}

#[test]
fn test_differing_plain_keys_stay_opaque_invariant() {
    let analyzer = PatternAnalyzer::default();
    let sessions = [
        session("next", 1, vec![RawAction::key(0, "Tab")]),
        session("next", 2, vec![RawAction::key(0, "Enter")]),
    ];
    let pattern = analyzer.analyze(&sessions).unwrap();
    assert_eq!(pattern.invariants.len(), 1);
    assert!(pattern.variants.is_empty());
    assert!(pattern.command_sequence.is_empty());
}

#[test]
fn test_uneven_sessions_keep_sequence_within_invariants() {
    let analyzer = PatternAnalyzer::default();
    let sessions = [
        session(
            "edit",
            1,
            vec![
                RawAction::pointer(0, 10.0, 10.0, target("a", "Edit")),
                RawAction::key(100, "x"),
                RawAction::wheel(200, 100.0, 0.0, 0.0),
            ],
        ),
        session(
            "edit",
            2,
            vec![
                RawAction::pointer(0, 30.0, 15.0, target("a", "Edit")),
                RawAction::wheel(100, 100.0, 0.0, 0.0),
            ],
        ),
    ];

    let pattern = analyzer.analyze(&sessions).unwrap();
    assert!(pattern.command_sequence.len() <= pattern.invariants.len());
    assert_eq!(pattern.variants[0].step_index, 1);
    assert_eq!(pattern.variants[0].variation_kind, VariationKind::Mixed);
}

#[test]
fn test_record_confidence_grows_with_attempts() {
    let analyzer = PatternAnalyzer::default();
    let make = |n: u32| -> Vec<ObservationSession> {
        (1..=n)
            .map(|i| session("save", i, vec![RawAction::pointer(0, 5.0, 5.0, target("button", "Save"))]))
            .collect()
    };

    let one = make(1);
    let three = make(3);
    let low = analyzer.to_knowledge_record(&analyzer.analyze(&one).unwrap(), &one);
    let high = analyzer.to_knowledge_record(&analyzer.analyze(&three).unwrap(), &three);

    assert!(low.confidence <= high.confidence);
    assert!(high.confidence <= CONFIDENCE_CEILING);
    assert_eq!(high.raw_observations.len(), 3);
    assert_eq!(high.commands(), vec!["CLICK:text=Save"]);
    assert!(high.description.contains("save"));
}
