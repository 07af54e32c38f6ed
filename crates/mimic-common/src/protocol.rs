use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Custom deserializer for HashMap<String, String> that filters out null values.
/// Host adapters report missing attributes as null rather than omitting them.
fn deserialize_nullable_string_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, Option<String>> = HashMap::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| v.map(|val| (k, val)))
        .collect())
}

/// A point in display units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Elements without a rendered box never take part in resolution.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x <= self.x + self.width
            && point.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementState {
    pub disabled: bool,
    pub focused: bool,
    pub focusable: bool,
}

/// One element of the rendered UI tree, as reported by a backend snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: u32,
    #[serde(rename = "type")]
    pub element_type: String, // "input", "button", "a", "div", ...
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,

    /// Structural path of the element (e.g. `form#login > button.primary`).
    #[serde(default)]
    pub selector: String,

    #[serde(default)]
    pub rect: Rect,

    #[serde(default, deserialize_with = "deserialize_nullable_string_map")]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub state: ElementState,
}

impl Element {
    /// All human-visible strings that text matching may look at.
    pub fn visible_strings(&self) -> impl Iterator<Item = &str> {
        [
            self.text.as_deref(),
            self.label.as_deref(),
            self.attributes.get("aria-label").map(String::as_str),
            self.placeholder.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    pub fn center(&self) -> Point {
        self.rect.center()
    }
}

/// The rendered UI tree at one moment, elements in document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiSnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl UiSnapshot {
    pub fn get(&self, id: u32) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Elements that have a rendered bounding box.
    pub fn rendered(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.rect.has_area())
    }

    /// Topmost rendered element under a point (last in document order wins).
    pub fn hit_test(&self, point: &Point) -> Option<&Element> {
        self.rendered().filter(|e| e.rect.contains(point)).last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// DOM-style button index.
    pub fn index(&self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }

    pub fn from_index(index: u8) -> Self {
        match index {
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }
}

/// Platform-level input event synthesized by the injector and handed to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyntheticEvent {
    PointerMove {
        at: Point,
    },
    PointerDown {
        at: Point,
        button: MouseButton,
        target: Option<u32>,
    },
    PointerUp {
        at: Point,
        button: MouseButton,
        target: Option<u32>,
    },
    Click {
        at: Point,
        button: MouseButton,
        click_count: u8,
        target: Option<u32>,
    },
    ContextMenu {
        at: Point,
        target: Option<u32>,
    },
    Wheel {
        at: Point,
        #[serde(default)]
        delta_x: f64,
        delta_y: f64,
        target: Option<u32>,
    },
    KeyDown {
        key: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modifiers: Vec<String>,
        target: Option<u32>,
    },
    KeyUp {
        key: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        modifiers: Vec<String>,
        target: Option<u32>,
    },
    /// Text insertion that follows a printable key-down.
    Input {
        text: String,
        target: Option<u32>,
    },
}

impl SyntheticEvent {
    pub fn target(&self) -> Option<u32> {
        match self {
            SyntheticEvent::PointerMove { .. } => None,
            SyntheticEvent::PointerDown { target, .. }
            | SyntheticEvent::PointerUp { target, .. }
            | SyntheticEvent::Click { target, .. }
            | SyntheticEvent::ContextMenu { target, .. }
            | SyntheticEvent::Wheel { target, .. }
            | SyntheticEvent::KeyDown { target, .. }
            | SyntheticEvent::KeyUp { target, .. }
            | SyntheticEvent::Input { target, .. } => *target,
        }
    }
}

/// Host window as seen by the window manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: String,
    pub title: String,
    pub position: Point,
    #[serde(default)]
    pub focused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: u32, rect: Rect) -> Element {
        Element {
            id,
            element_type: "div".into(),
            role: None,
            text: None,
            label: None,
            value: None,
            placeholder: None,
            selector: String::new(),
            rect,
            attributes: HashMap::new(),
            state: ElementState::default(),
        }
    }

    #[test]
    fn test_hit_test_prefers_topmost() {
        let snapshot = UiSnapshot {
            title: "t".into(),
            elements: vec![
                element(1, Rect { x: 0.0, y: 0.0, width: 500.0, height: 500.0 }),
                element(2, Rect { x: 10.0, y: 10.0, width: 50.0, height: 20.0 }),
                element(3, Rect { x: 10.0, y: 10.0, width: 0.0, height: 0.0 }),
            ],
        };

        assert_eq!(snapshot.hit_test(&Point::new(20.0, 15.0)).map(|e| e.id), Some(2));
        assert_eq!(snapshot.hit_test(&Point::new(200.0, 200.0)).map(|e| e.id), Some(1));
        assert!(snapshot.hit_test(&Point::new(900.0, 900.0)).is_none());
    }

    #[test]
    fn test_null_attributes_are_dropped() {
        let json = r#"{"id":1,"type":"button","attributes":{"role":"button","title":null}}"#;
        let elem: Element = serde_json::from_str(json).unwrap();
        assert_eq!(elem.attributes.len(), 1);
        assert!(!elem.rect.has_area());
    }
}
