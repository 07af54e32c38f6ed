//! In-memory UI host loaded from a YAML/JSON fixture.
//!
//! Applies dispatched events to its own element tree (focus, typed values,
//! scrolling) and keeps the full event log, so replays can be driven and
//! inspected without a real display.

use async_trait::async_trait;
use mimic_common::protocol::{Element, Point, SyntheticEvent, UiSnapshot, WindowInfo};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::backend::{Backend, BackendError, WindowManager};

const FOCUSABLE_TYPES: &[&str] = &["input", "textarea", "select", "button", "a"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualFixture {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
    /// Application ids that `OPEN_APP` accepts.
    #[serde(default)]
    pub apps: Vec<String>,
}

impl VirtualFixture {
    pub async fn load(path: &Path) -> Result<Self, BackendError> {
        let content = tokio::fs::read_to_string(path).await?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, BackendError> {
        serde_yaml::from_str(content).map_err(|e| BackendError::Serialization(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct VirtualBackend {
    snapshot: UiSnapshot,
    windows: Vec<WindowInfo>,
    apps: Vec<String>,
    cursor: Point,
    scroll: Point,
    dispatched: Vec<SyntheticEvent>,
    ready: bool,
    opened: u32,
}

impl VirtualBackend {
    pub fn new(snapshot: UiSnapshot) -> Self {
        Self {
            snapshot,
            ..Default::default()
        }
    }

    pub fn from_fixture(fixture: VirtualFixture) -> Self {
        Self {
            snapshot: UiSnapshot {
                title: fixture.title,
                elements: fixture.elements,
            },
            windows: fixture.windows,
            apps: fixture.apps,
            ..Default::default()
        }
    }

    pub async fn load(path: &Path) -> Result<Self, BackendError> {
        Ok(Self::from_fixture(VirtualFixture::load(path).await?))
    }

    /// Every event dispatched so far, in order.
    pub fn dispatched(&self) -> &[SyntheticEvent] {
        &self.dispatched
    }

    pub fn clear_dispatched(&mut self) {
        self.dispatched.clear();
    }

    pub fn element(&self, id: u32) -> Option<&Element> {
        self.snapshot.get(id)
    }

    pub fn value_of(&self, id: u32) -> Option<&str> {
        self.element(id).and_then(|e| e.value.as_deref())
    }

    pub fn focused(&self) -> Option<u32> {
        self.snapshot
            .elements
            .iter()
            .find(|e| e.state.focused)
            .map(|e| e.id)
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn scroll_offset(&self) -> Point {
        self.scroll
    }

    pub fn windows(&self) -> &[WindowInfo] {
        &self.windows
    }

    fn element_mut(&mut self, id: u32) -> Result<&mut Element, BackendError> {
        self.snapshot
            .elements
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(BackendError::ElementNotFound { id })
    }

    fn set_focus(&mut self, id: Option<u32>) {
        for element in &mut self.snapshot.elements {
            element.state.focused = Some(element.id) == id;
        }
    }

    fn edit_target(&self, target: Option<u32>) -> Option<u32> {
        target.or_else(|| self.focused())
    }

    fn apply(&mut self, event: &SyntheticEvent) -> Result<(), BackendError> {
        match event {
            SyntheticEvent::PointerMove { at } => self.cursor = *at,
            SyntheticEvent::PointerDown {
                target: Some(id), ..
            } => {
                let element = self.element_mut(*id)?;
                if element.state.disabled {
                    return Err(BackendError::ElementDisabled { id: *id });
                }
                if is_focusable(element) {
                    self.set_focus(Some(*id));
                }
            }
            SyntheticEvent::Wheel {
                delta_x, delta_y, ..
            } => {
                self.scroll.x += delta_x;
                self.scroll.y += delta_y;
            }
            SyntheticEvent::KeyDown { key, target, .. } if key == "Backspace" => {
                if let Some(id) = self.edit_target(*target) {
                    let element = self.element_mut(id)?;
                    if let Some(value) = element.value.as_mut() {
                        value.pop();
                    }
                }
            }
            SyntheticEvent::Input { text, target } => {
                if let Some(id) = self.edit_target(*target) {
                    let element = self.element_mut(id)?;
                    element.value.get_or_insert_with(String::new).push_str(text);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn window_mut(&mut self, id: &str) -> Result<&mut WindowInfo, BackendError> {
        self.windows
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| BackendError::WindowNotFound(id.to_string()))
    }
}

fn is_focusable(element: &Element) -> bool {
    element.state.focusable
        || FOCUSABLE_TYPES.contains(&element.element_type.to_lowercase().as_str())
        || element.attributes.contains_key("tabindex")
        || element.attributes.contains_key("contenteditable")
}

#[async_trait]
impl Backend for VirtualBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        self.ready = true;
        info!(
            "Virtual host '{}' ready with {} elements",
            self.snapshot.title,
            self.snapshot.elements.len()
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.ready = false;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready
    }

    async fn snapshot(&mut self) -> Result<UiSnapshot, BackendError> {
        if !self.ready {
            return Err(BackendError::NotReady);
        }
        Ok(self.snapshot.clone())
    }

    async fn query_selector(&mut self, selector: &str) -> Result<Option<u32>, BackendError> {
        if selector.trim().is_empty() {
            return Err(BackendError::SelectorInvalid {
                selector: selector.to_string(),
            });
        }
        Ok(self
            .snapshot
            .rendered()
            .find(|e| selector_matches(selector, e))
            .map(|e| e.id))
    }

    async fn dispatch(&mut self, event: SyntheticEvent) -> Result<(), BackendError> {
        if !self.ready {
            return Err(BackendError::NotReady);
        }
        self.apply(&event)?;
        debug!("Dispatched {:?}", event);
        self.dispatched.push(event);
        Ok(())
    }

    async fn focus(&mut self, id: u32) -> Result<(), BackendError> {
        let element = self.element_mut(id)?;
        if element.state.disabled {
            return Err(BackendError::ElementDisabled { id });
        }
        if !is_focusable(element) {
            return Err(BackendError::NotFocusable { id });
        }
        self.set_focus(Some(id));
        Ok(())
    }

    async fn active_element(&mut self) -> Result<Option<u32>, BackendError> {
        Ok(self.focused())
    }

    fn window_manager(&mut self) -> Option<&mut dyn WindowManager> {
        Some(self)
    }
}

#[async_trait]
impl WindowManager for VirtualBackend {
    async fn open_app(&mut self, app_id: &str) -> Result<WindowInfo, BackendError> {
        if !self.apps.iter().any(|a| a == app_id) {
            return Err(BackendError::UnknownApplication(app_id.to_string()));
        }
        self.opened += 1;
        for window in &mut self.windows {
            window.focused = false;
        }
        let window = WindowInfo {
            id: format!("{}-{}", app_id, self.opened),
            title: app_id.to_string(),
            position: Point::new(40.0 * f64::from(self.opened), 40.0 * f64::from(self.opened)),
            focused: true,
        };
        self.windows.push(window.clone());
        Ok(window)
    }

    async fn close_window(&mut self, id: &str) -> Result<(), BackendError> {
        let before = self.windows.len();
        self.windows.retain(|w| w.id != id);
        if self.windows.len() == before {
            return Err(BackendError::WindowNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn focus_window(&mut self, id: &str) -> Result<(), BackendError> {
        self.window_mut(id)?;
        for window in &mut self.windows {
            window.focused = window.id == id;
        }
        Ok(())
    }

    async fn move_window(&mut self, id: &str, to: Point) -> Result<(), BackendError> {
        self.window_mut(id)?.position = to;
        Ok(())
    }

    async fn list_windows(&self) -> Vec<WindowInfo> {
        self.windows.clone()
    }
}

/// Minimal selector matching: exact recorded selector, or the last compound
/// (`tag#id.class[attr=value]`) checked against the element.
fn selector_matches(query: &str, element: &Element) -> bool {
    let query = query.trim();
    if element.selector == query {
        return true;
    }
    let Some(compound) = last_compound(query) else {
        return false;
    };
    let own_parts = last_compound(&element.selector)
        .map(simple_parts)
        .unwrap_or_default();

    simple_parts(compound).iter().all(|part| {
        if let Some(id) = part.strip_prefix('#') {
            element.attributes.get("id").is_some_and(|v| v == id) || own_parts.contains(part)
        } else if let Some(class) = part.strip_prefix('.') {
            element
                .attributes
                .get("class")
                .is_some_and(|v| v.split_whitespace().any(|c| c == class))
                || own_parts.contains(part)
        } else if let Some(attr) = part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
            match attr.split_once('=') {
                Some((key, value)) => {
                    let value = value.trim_matches(|c| c == '"' || c == '\'');
                    element.attributes.get(key.trim()).is_some_and(|v| v == value)
                }
                None => element.attributes.contains_key(attr.trim()),
            }
        } else {
            part == "*" || element.element_type.eq_ignore_ascii_case(part)
        }
    })
}

fn last_compound(selector: &str) -> Option<&str> {
    selector
        .rsplit(|c: char| c == '>' || c.is_whitespace())
        .find(|s| !s.is_empty())
}

fn simple_parts(compound: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for c in compound.chars() {
        match c {
            '[' if !in_brackets => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
                current.push(c);
                in_brackets = true;
            }
            ']' if in_brackets => {
                current.push(c);
                parts.push(std::mem::take(&mut current));
                in_brackets = false;
            }
            '#' | '.' if !in_brackets => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}
