use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::protocol::Point;

/// A step judged stable across all observed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantStep {
    pub step_index: usize,
    pub description: String,
    pub action_kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_identifier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariationKind {
    Position,
    Timing,
    Choice,
    /// Attempts performed different kinds of action at this step.
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SampledValue {
    Point(Point),
    Delta(f64),
    Text(String),
    Kind(ActionKind),
}

impl std::fmt::Display for SampledValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampledValue::Point(p) => write!(f, "({:.0}, {:.0})", p.x, p.y),
            SampledValue::Delta(d) => write!(f, "{:.1}", d),
            SampledValue::Text(t) => write!(f, "\"{}\"", t),
            SampledValue::Kind(k) => write!(f, "{}", k),
        }
    }
}

/// A step judged to differ meaningfully across attempts; never replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStep {
    pub step_index: usize,
    pub description: String,
    pub variation_kind: VariationKind,
    pub sampled_values: Vec<SampledValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<SampledValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEntry {
    pub step_index: usize,
    pub primary_strategy: String,
    pub fallback_strategies: Vec<String>,
}

/// Generalized plan derived from a batch of observation sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPattern {
    pub task_name: String,
    pub total_attempts: usize,
    pub invariants: Vec<InvariantStep>,
    pub variants: Vec<VariantStep>,
    pub command_sequence: Vec<String>,
    pub fallback_strategies: Vec<FallbackEntry>,
    pub success_criteria: String,
}

impl ExtractedPattern {
    pub fn fallback_for(&self, step_index: usize) -> Option<&FallbackEntry> {
        self.fallback_strategies
            .iter()
            .find(|f| f.step_index == step_index)
    }

    pub fn is_invariant(&self, step_index: usize) -> bool {
        self.invariants.iter().any(|s| s.step_index == step_index)
    }

    pub fn is_variant(&self, step_index: usize) -> bool {
        self.variants.iter().any(|s| s.step_index == step_index)
    }
}
