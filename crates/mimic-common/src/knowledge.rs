use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ObservationSession;

/// Current schema version of persisted knowledge records.
pub const KNOWLEDGE_SCHEMA_VERSION: u32 = 1;

/// Upper bound on the confidence of a freshly learned behavior.
pub const CONFIDENCE_CEILING: f64 = 0.95;

/// Confidence of a behavior learned from `attempts` demonstrations.
pub fn initial_confidence(attempts: usize) -> f64 {
    (0.7 + 0.1 * attempts as f64).min(CONFIDENCE_CEILING)
}

/// A synthesized command with the commands to try if it cannot find its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
}

impl PlanStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            fallbacks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BehaviorStatistics {
    pub times_executed: u64,
    pub success_rate: f64,
    pub avg_execution_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
}

impl BehaviorStatistics {
    /// Fold one replay outcome into the running averages.
    pub fn record(&mut self, success: bool, duration_ms: f64, failure_reason: Option<String>) {
        let n = self.times_executed as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * n + outcome) / (n + 1.0);
        self.avg_execution_time_ms = (self.avg_execution_time_ms * n + duration_ms) / (n + 1.0);
        self.times_executed += 1;
        if !success {
            self.last_failure_reason = failure_reason;
        }
    }
}

/// A persisted, confidence-scored, replayable behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub description: String,
    pub category: String,
    pub decision_tree: Vec<PlanStep>,
    #[serde(default)]
    pub raw_observations: Vec<ObservationSession>,
    #[serde(default)]
    pub statistics: BehaviorStatistics,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tested: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    pub fn commands(&self) -> Vec<String> {
        self.decision_tree.iter().map(|s| s.command.clone()).collect()
    }

    pub fn apply(&mut self, patch: BehaviorPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(decision_tree) = patch.decision_tree {
            self.decision_tree = decision_tree;
        }
        if let Some(confidence) = patch.confidence {
            self.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(statistics) = patch.statistics {
            self.statistics = statistics;
        }
        if let Some(last_tested) = patch.last_tested {
            self.last_tested = Some(last_tested);
        }
    }
}

/// Explicit edit of a stored behavior; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub decision_tree: Option<Vec<PlanStep>>,
    pub confidence: Option<f64>,
    pub statistics: Option<BehaviorStatistics>,
    pub last_tested: Option<DateTime<Utc>>,
}
