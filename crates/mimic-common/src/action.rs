use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::protocol::MouseButton;

/// Attributes kept on an [`ElementDescriptor`]; everything else is dropped at capture time.
pub const DESCRIPTOR_ATTRIBUTES: &[&str] = &["role", "aria-label", "placeholder", "type", "title"];

/// Default cap on the visible text stored in a descriptor.
pub const DEFAULT_TEXT_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Pointer,
    Key,
    Wheel,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::Pointer => "pointer",
            ActionKind::Key => "key",
            ActionKind::Wheel => "wheel",
        };
        f.write_str(name)
    }
}

/// Matching-only snapshot of an event target. Never used to mutate the UI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl ElementDescriptor {
    /// Build a descriptor, trimming the text to `text_cap` characters and
    /// keeping only whitelisted attributes.
    pub fn new(
        tag: &str,
        id: Option<&str>,
        classes: &[String],
        text: &str,
        attributes: &HashMap<String, String>,
        text_cap: usize,
    ) -> Self {
        let trimmed: String = text.trim().chars().take(text_cap).collect();
        let attributes = attributes
            .iter()
            .filter(|(k, _)| DESCRIPTOR_ATTRIBUTES.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            tag: tag.to_lowercase(),
            id: id.filter(|s| !s.is_empty()).map(str::to_string),
            classes: classes.to_vec(),
            text: trimmed.trim_end().to_string(),
            attributes,
        }
    }

    /// Short human-readable identifier (`button#save`, `input[placeholder=Name]`, ...).
    pub fn identifier(&self) -> String {
        if let Some(id) = &self.id {
            return format!("{}#{}", self.tag, id);
        }
        if !self.text.is_empty() {
            return format!("{} \"{}\"", self.tag, self.text);
        }
        if let Some(placeholder) = self.attributes.get("placeholder") {
            return format!("{}[placeholder={}]", self.tag, placeholder);
        }
        match self.classes.first() {
            Some(class) => format!("{}.{}", self.tag, class),
            None => self.tag.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Pointer {
        x: f64,
        y: f64,
        button: MouseButton,
        click_count: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ElementDescriptor>,
    },
    Key {
        key: String,
        /// Literal text, only when the key produced a single printable character.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Wheel {
        delta_y: f64,
        x: f64,
        y: f64,
    },
}

/// A single captured input event. `offset_ms` is relative to the session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub offset_ms: u64,
    pub payload: ActionPayload,
}

impl RawAction {
    pub fn kind(&self) -> ActionKind {
        match self.payload {
            ActionPayload::Pointer { .. } => ActionKind::Pointer,
            ActionPayload::Key { .. } => ActionKind::Key,
            ActionPayload::Wheel { .. } => ActionKind::Wheel,
        }
    }

    pub fn pointer(offset_ms: u64, x: f64, y: f64, target: Option<ElementDescriptor>) -> Self {
        Self {
            offset_ms,
            payload: ActionPayload::Pointer {
                x,
                y,
                button: MouseButton::Left,
                click_count: 1,
                target,
            },
        }
    }

    pub fn key(offset_ms: u64, key: &str) -> Self {
        let mut chars = key.chars();
        let text = match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => Some(key.to_string()),
            _ => None,
        };
        Self {
            offset_ms,
            payload: ActionPayload::Key {
                key: key.to_string(),
                text,
            },
        }
    }

    pub fn wheel(offset_ms: u64, delta_y: f64, x: f64, y: f64) -> Self {
        Self {
            offset_ms,
            payload: ActionPayload::Wheel { delta_y, x, y },
        }
    }
}

/// One timestamped recording of a user performing a task once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSession {
    pub session_id: Uuid,
    pub task_name: String,
    pub attempt_number: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub actions: Vec<RawAction>,
}

impl ObservationSession {
    pub fn new(task_name: &str, attempt_number: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            task_name: task_name.to_string(),
            attempt_number,
            start_time: Utc::now(),
            end_time: None,
            actions: Vec::new(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
