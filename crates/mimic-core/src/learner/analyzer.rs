//! Turns a batch of observation sessions of one task into a replayable pattern.
//!
//! Sessions are aligned by position: the i-th action of every session is taken
//! to be the same logical step. Each aligned group is then classified as an
//! invariant step (replayed) or a variant step (reported, never replayed).

use chrono::Utc;
use mimic_common::action::{ActionKind, ActionPayload, ElementDescriptor, ObservationSession, RawAction};
use mimic_common::knowledge::{
    BehaviorStatistics, KNOWLEDGE_SCHEMA_VERSION, KnowledgeRecord, PlanStep, initial_confidence,
};
use mimic_common::pattern::{
    ExtractedPattern, FallbackEntry, InvariantStep, SampledValue, VariantStep, VariationKind,
};
use mimic_common::protocol::{MouseButton, Point};
use std::fmt::Write as _;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::AnalyzerConfig;

/// Marker recorded for keyboard steps that have no single replayable form.
pub const GENERIC_KEYBOARD_MARKER: &str = "KEYBOARD_INPUT";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("Insufficient data: at least one observation session is required")]
    InsufficientData,

    #[error("Sessions belong to different tasks: '{expected}' and '{found}'")]
    MixedTasks { expected: String, found: String },
}

enum StepClass {
    /// Replayable invariant with its primary command and fallbacks.
    Replayable {
        step: InvariantStep,
        primary: String,
        fallbacks: Vec<String>,
    },
    /// Invariant with no replayable command.
    Opaque(InvariantStep),
    Variant(VariantStep),
}

struct PointerSample<'a> {
    point: Point,
    button: MouseButton,
    click_count: u8,
    target: Option<&'a ElementDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct PatternAnalyzer {
    config: AnalyzerConfig,
}

impl PatternAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, sessions: &[ObservationSession]) -> Result<ExtractedPattern, AnalysisError> {
        let first = sessions.first().ok_or(AnalysisError::InsufficientData)?;
        if let Some(other) = sessions.iter().find(|s| s.task_name != first.task_name) {
            return Err(AnalysisError::MixedTasks {
                expected: first.task_name.clone(),
                found: other.task_name.clone(),
            });
        }

        let step_count = sessions.iter().map(|s| s.actions.len()).max().unwrap_or(0);
        let mut invariants = Vec::new();
        let mut variants = Vec::new();
        let mut fallback_strategies = Vec::new();

        for step_index in 0..step_count {
            let group: Vec<&RawAction> = sessions
                .iter()
                .filter_map(|s| s.actions.get(step_index))
                .collect();

            match self.classify(step_index, &group) {
                StepClass::Replayable {
                    step,
                    primary,
                    fallbacks,
                } => {
                    debug!("Step {} invariant: {}", step_index, primary);
                    fallback_strategies.push(FallbackEntry {
                        step_index,
                        primary_strategy: primary,
                        fallback_strategies: fallbacks,
                    });
                    invariants.push(step);
                }
                StepClass::Opaque(step) => {
                    debug!("Step {} invariant without replay form", step_index);
                    invariants.push(step);
                }
                StepClass::Variant(step) => {
                    debug!("Step {} variant ({:?})", step_index, step.variation_kind);
                    variants.push(step);
                }
            }
        }

        let command_sequence: Vec<String> = invariants
            .iter()
            .filter_map(|step| {
                fallback_strategies
                    .iter()
                    .find(|f| f.step_index == step.step_index)
            })
            .map(|f| f.primary_strategy.clone())
            .collect();

        let success_criteria = if command_sequence.is_empty() {
            "No replayable steps: every step varied between attempts".to_string()
        } else {
            format!(
                "All {} replayable steps of '{}' complete without unresolved elements",
                command_sequence.len(),
                first.task_name
            )
        };

        info!(
            "Analyzed '{}': {} attempts, {} invariant, {} variant, {} commands",
            first.task_name,
            sessions.len(),
            invariants.len(),
            variants.len(),
            command_sequence.len()
        );

        Ok(ExtractedPattern {
            task_name: first.task_name.clone(),
            total_attempts: sessions.len(),
            invariants,
            variants,
            command_sequence,
            fallback_strategies,
            success_criteria,
        })
    }

    fn classify(&self, step_index: usize, group: &[&RawAction]) -> StepClass {
        let kinds: Vec<ActionKind> = group.iter().map(|a| a.kind()).collect();
        if kinds.iter().any(|k| *k != kinds[0]) {
            return classify_mixed(step_index, &kinds);
        }

        match kinds[0] {
            ActionKind::Pointer => self.classify_pointer(step_index, group),
            ActionKind::Key => classify_key(step_index, group),
            ActionKind::Wheel => self.classify_wheel(step_index, group),
        }
    }

    fn classify_pointer(&self, step_index: usize, group: &[&RawAction]) -> StepClass {
        let samples: Vec<PointerSample<'_>> = group
            .iter()
            .filter_map(|a| match &a.payload {
                ActionPayload::Pointer {
                    x,
                    y,
                    button,
                    click_count,
                    target,
                } => Some(PointerSample {
                    point: Point::new(*x, *y),
                    button: *button,
                    click_count: *click_count,
                    target: target.as_ref(),
                }),
                _ => None,
            })
            .collect();

        let (verb, label) = click_verb(samples[0].button, samples[0].click_count);
        let points: Vec<Point> = samples.iter().map(|s| s.point).collect();
        let center = centroid(&points);

        let texts: Vec<&str> = samples
            .iter()
            .map(|s| s.target.map_or("", |t| t.text.as_str()))
            .collect();
        if !texts[0].is_empty() && texts.iter().all(|t| *t == texts[0]) {
            let target = samples[0].target;
            let tag = target.map_or("*", |t| t.tag.as_str());
            return StepClass::Replayable {
                step: InvariantStep {
                    step_index,
                    description: format!("{} \"{}\" ({})", label, texts[0], tag),
                    action_kind: ActionKind::Pointer,
                    element_identifier: target.map(ElementDescriptor::identifier),
                },
                primary: format!("{}:text={}", verb, texts[0]),
                fallbacks: vec![
                    format!("{}:near={},{}", verb, coord(center.x), coord(center.y)),
                    format!("{}:tag={}", verb, tag),
                ],
            };
        }

        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        let threshold = self.config.position_threshold;
        if std_dev(&xs) < threshold && std_dev(&ys) < threshold {
            return StepClass::Replayable {
                step: InvariantStep {
                    step_index,
                    description: format!(
                        "{} at ({}, {})",
                        label,
                        coord(center.x),
                        coord(center.y)
                    ),
                    action_kind: ActionKind::Pointer,
                    element_identifier: common_identifier(&samples),
                },
                primary: format!("{}:{}:{}", verb, coord(center.x), coord(center.y)),
                fallbacks: vec![format!(
                    "{}:near={},{};radius={}",
                    verb,
                    coord(center.x),
                    coord(center.y),
                    coord(self.config.proximity_radius)
                )],
            };
        }

        StepClass::Variant(VariantStep {
            step_index,
            description: format!("{} position varies between attempts", label),
            variation_kind: VariationKind::Position,
            sampled_values: points.into_iter().map(SampledValue::Point).collect(),
            average: Some(SampledValue::Point(center)),
        })
    }

    fn classify_wheel(&self, step_index: usize, group: &[&RawAction]) -> StepClass {
        let mut deltas = Vec::with_capacity(group.len());
        let mut points = Vec::with_capacity(group.len());
        for action in group {
            if let ActionPayload::Wheel { delta_y, x, y } = action.payload {
                deltas.push(delta_y);
                points.push(Point::new(x, y));
            }
        }
        let average = mean(&deltas);

        if std_dev(&deltas) < self.config.wheel_threshold {
            let direction = if average < 0.0 { "up" } else { "down" };
            let amount = coord(average.abs());
            let center = centroid(&points);
            return StepClass::Replayable {
                step: InvariantStep {
                    step_index,
                    description: format!("Scroll {} {}", direction, amount),
                    action_kind: ActionKind::Wheel,
                    element_identifier: None,
                },
                primary: format!(
                    "SCROLL:{}:{}:{}:{}",
                    direction,
                    amount,
                    coord(center.x),
                    coord(center.y)
                ),
                fallbacks: vec![format!("SCROLL:{}:{}", direction, amount)],
            };
        }

        StepClass::Variant(VariantStep {
            step_index,
            description: "Scroll distance varies between attempts".to_string(),
            variation_kind: VariationKind::Position,
            sampled_values: deltas.into_iter().map(SampledValue::Delta).collect(),
            average: Some(SampledValue::Delta(average)),
        })
    }

    /// Build a knowledge record from a pattern, with a textual briefing as its description.
    pub fn to_knowledge_record(
        &self,
        pattern: &ExtractedPattern,
        sessions: &[ObservationSession],
    ) -> KnowledgeRecord {
        let decision_tree = pattern
            .fallback_strategies
            .iter()
            .map(|f| PlanStep {
                command: f.primary_strategy.clone(),
                fallbacks: f.fallback_strategies.clone(),
            })
            .collect();

        KnowledgeRecord {
            id: Uuid::new_v4().to_string(),
            version: KNOWLEDGE_SCHEMA_VERSION,
            name: pattern.task_name.clone(),
            description: briefing(pattern),
            category: "learned".to_string(),
            decision_tree,
            raw_observations: sessions.to_vec(),
            statistics: BehaviorStatistics::default(),
            confidence: initial_confidence(pattern.total_attempts),
            last_tested: None,
            created_at: Utc::now(),
        }
    }
}

fn classify_mixed(step_index: usize, kinds: &[ActionKind]) -> StepClass {
    // Counts in first-seen order, so ties go to the kind seen first.
    let mut counts: Vec<(ActionKind, usize)> = Vec::new();
    for kind in kinds {
        match counts.iter_mut().find(|(k, _)| k == kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((*kind, 1)),
        }
    }
    let mut dominant = counts[0];
    for entry in &counts[1..] {
        if entry.1 > dominant.1 {
            dominant = *entry;
        }
    }

    StepClass::Variant(VariantStep {
        step_index,
        description: format!("Mixed actions, mostly {}", dominant.0),
        variation_kind: VariationKind::Mixed,
        sampled_values: kinds.iter().copied().map(SampledValue::Kind).collect(),
        average: Some(SampledValue::Kind(dominant.0)),
    })
}

fn classify_key(step_index: usize, group: &[&RawAction]) -> StepClass {
    let mut keys = Vec::with_capacity(group.len());
    let mut texts = Vec::with_capacity(group.len());
    for action in group {
        if let ActionPayload::Key { key, text } = &action.payload {
            keys.push(key.as_str());
            texts.push(text.as_deref());
        }
    }

    let first = texts.first().copied().flatten();
    if let Some(first) = first.filter(|f| texts.iter().all(|t| *t == Some(*f))) {
        return StepClass::Replayable {
            step: invariant_key(step_index, format!("Type \"{}\"", first)),
            primary: format!("TYPE:{}", first),
            fallbacks: Vec::new(),
        };
    }

    // Any typed text that is not shared by every attempt, including attempts
    // that pressed a non-text key instead, is a user input slot.
    if texts.iter().any(Option::is_some) {
        return StepClass::Variant(VariantStep {
            step_index,
            description: "Typed text varies between attempts (user input slot)".to_string(),
            variation_kind: VariationKind::Choice,
            sampled_values: texts
                .iter()
                .zip(&keys)
                .map(|(text, key)| SampledValue::Text(text.unwrap_or(key).to_string()))
                .collect(),
            average: None,
        });
    }

    if keys.iter().all(|k| *k == keys[0]) {
        return StepClass::Replayable {
            step: invariant_key(step_index, format!("Press {}", keys[0])),
            primary: format!("PRESS_KEY:{}", keys[0]),
            fallbacks: Vec::new(),
        };
    }

    StepClass::Opaque(invariant_key(
        step_index,
        format!("Keyboard input ({})", GENERIC_KEYBOARD_MARKER),
    ))
}

fn invariant_key(step_index: usize, description: String) -> InvariantStep {
    InvariantStep {
        step_index,
        description,
        action_kind: ActionKind::Key,
        element_identifier: None,
    }
}

fn click_verb(button: MouseButton, click_count: u8) -> (&'static str, &'static str) {
    match button {
        MouseButton::Right => ("RIGHT_CLICK", "Right-click"),
        _ if click_count >= 2 => ("DOUBLE_CLICK", "Double-click"),
        _ => ("CLICK", "Click"),
    }
}

fn common_identifier(samples: &[PointerSample<'_>]) -> Option<String> {
    let first = samples.first()?.target?.identifier();
    samples
        .iter()
        .all(|s| s.target.map(ElementDescriptor::identifier).as_ref() == Some(&first))
        .then_some(first)
}

fn briefing(pattern: &ExtractedPattern) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task: {}", pattern.task_name);
    let _ = writeln!(out, "Learned from {} attempt(s).", pattern.total_attempts);
    let _ = writeln!(out, "Steps:");

    let mut lines: Vec<(usize, String)> = Vec::new();
    for step in &pattern.invariants {
        let mut line = format!("  [{}] {}", step.step_index, step.description);
        match pattern.fallback_for(step.step_index) {
            Some(entry) => {
                let _ = write!(line, "\n      primary: {}", entry.primary_strategy);
                if !entry.fallback_strategies.is_empty() {
                    let _ = write!(
                        line,
                        "\n      fallbacks: {}",
                        entry.fallback_strategies.join(", ")
                    );
                }
            }
            None => line.push_str("\n      not replayed"),
        }
        lines.push((step.step_index, line));
    }
    for step in &pattern.variants {
        lines.push((
            step.step_index,
            format!("  [{}] varies: {}", step.step_index, step.description),
        ));
    }
    lines.sort_by_key(|(index, _)| *index);
    for (_, line) in lines {
        let _ = writeln!(out, "{}", line);
    }

    if !pattern.variants.is_empty() {
        let _ = writeln!(out, "Adaptations:");
        for step in &pattern.variants {
            let samples: Vec<String> = step.sampled_values.iter().map(|v| v.to_string()).collect();
            let _ = write!(out, "  - step {}: saw {}", step.step_index, samples.join(", "));
            if let Some(average) = &step.average {
                let _ = write!(out, " (typical {})", average);
            }
            out.push('\n');
        }
    }

    let _ = write!(out, "Success: {}", pattern.success_criteria);
    out
}

fn coord(v: f64) -> String {
    format!("{:.0}", v)
}

fn centroid(points: &[Point]) -> Point {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    Point::new(mean(&xs), mean(&ys))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
