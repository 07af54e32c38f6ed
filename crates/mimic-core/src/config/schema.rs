use mimic_common::action::DEFAULT_TEXT_CAP;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MimicConfig {
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_text_cap")]
    pub text_cap: usize,
    /// Container ids of the recorder's own UI; events inside them are never captured.
    #[serde(default = "default_own_surface_ids")]
    pub own_surface_ids: Vec<String>,
    /// Attribute that marks an element (and its subtree) as recorder UI.
    #[serde(default = "default_own_surface_marker")]
    pub own_surface_marker: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            text_cap: default_text_cap(),
            own_surface_ids: default_own_surface_ids(),
            own_surface_marker: default_own_surface_marker(),
        }
    }
}

fn default_text_cap() -> usize {
    DEFAULT_TEXT_CAP
}

fn default_own_surface_ids() -> Vec<String> {
    vec!["mimic-panel".to_string()]
}

fn default_own_surface_marker() -> String {
    "data-mimic-ui".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Max population std-dev (display units, per axis) for a position-anchored click.
    #[serde(default = "default_position_threshold")]
    pub position_threshold: f64,
    /// Max population std-dev of wheel deltas for an invariant scroll.
    #[serde(default = "default_wheel_threshold")]
    pub wheel_threshold: f64,
    /// Search radius of the nearby-region fallback.
    #[serde(default = "default_proximity_radius")]
    pub proximity_radius: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            position_threshold: default_position_threshold(),
            wheel_threshold: default_wheel_threshold(),
            proximity_radius: default_proximity_radius(),
        }
    }
}

fn default_position_threshold() -> f64 {
    50.0
}

fn default_wheel_threshold() -> f64 {
    100.0
}

fn default_proximity_radius() -> f64 {
    150.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default = "default_type_delay_ms")]
    pub type_delay_ms: u64,
    #[serde(default = "default_drag_steps")]
    pub drag_steps: u32,
    #[serde(default = "default_drag_step_delay_ms")]
    pub drag_step_delay_ms: u64,
    #[serde(default = "default_double_click_gap_ms")]
    pub double_click_gap_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            type_delay_ms: default_type_delay_ms(),
            drag_steps: default_drag_steps(),
            drag_step_delay_ms: default_drag_step_delay_ms(),
            double_click_gap_ms: default_double_click_gap_ms(),
        }
    }
}

impl ReplayConfig {
    /// No pacing delays; used by tests and dry runs.
    pub fn instant() -> Self {
        Self {
            type_delay_ms: 0,
            drag_steps: default_drag_steps(),
            drag_step_delay_ms: 0,
            double_click_gap_ms: 0,
        }
    }
}

fn default_type_delay_ms() -> u64 {
    50
}

fn default_drag_steps() -> u32 {
    10
}

fn default_drag_step_delay_ms() -> u64 {
    16
}

fn default_double_click_gap_ms() -> u64 {
    80
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file backing the knowledge store.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Directory holding recorded sessions, one subdirectory per task.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    /// Environment variable holding the store secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: Option<String>,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Display geometry used in the device fingerprint (e.g. `1920x1080`).
    #[serde(default)]
    pub display: Option<String>,
    /// Locale used in the device fingerprint; falls back to `$LANG`.
    #[serde(default)]
    pub locale: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            sessions_dir: default_sessions_dir(),
            secret_env: default_secret_env(),
            iterations: default_iterations(),
            display: None,
            locale: None,
        }
    }
}

fn mimic_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mimic")
}

fn default_store_path() -> PathBuf {
    mimic_home().join("knowledge.json")
}

fn default_sessions_dir() -> PathBuf {
    mimic_home().join("sessions")
}

fn default_secret_env() -> Option<String> {
    Some("MIMIC_STORE_SECRET".to_string())
}

fn default_iterations() -> u32 {
    100_000
}
