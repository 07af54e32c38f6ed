use serde::{Deserialize, Serialize};
use std::fmt;

use crate::locator::Locator;
use crate::protocol::Point;

/// Where a click-style command lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointerTarget {
    /// Wherever the pointer currently is.
    Current,
    Point(Point),
    Element(Locator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            "left" => Some(ScrollDirection::Left),
            "right" => Some(ScrollDirection::Right),
            _ => None,
        }
    }

    /// Signed wheel delta for a magnitude in this direction.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            ScrollDirection::Up | ScrollDirection::Left => -amount.abs(),
            ScrollDirection::Down | ScrollDirection::Right => amount.abs(),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        };
        f.write_str(s)
    }
}

/// One replayable instruction. `Display` renders the textual `VERB:arg:arg` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    MouseMove(Point),
    Click(PointerTarget),
    RightClick(PointerTarget),
    DoubleClick(PointerTarget),
    Scroll {
        direction: ScrollDirection,
        amount: f64,
        at: Option<Point>,
    },
    Drag {
        from: Point,
        to: Point,
    },
    Type(String),
    PressKey(String),
    KeyCombo {
        modifiers: Vec<String>,
        key: String,
    },
    Backspace(u32),
    FocusElement(Locator),
    Wait(u64),
    OpenApp(String),
    CloseWindow(String),
    MoveWindow {
        id: String,
        to: Point,
    },
    FocusWindow(String),
    Finished,
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::MouseMove(_) => "MOUSE_MOVE",
            Command::Click(_) => "CLICK",
            Command::RightClick(_) => "RIGHT_CLICK",
            Command::DoubleClick(_) => "DOUBLE_CLICK",
            Command::Scroll { .. } => "SCROLL",
            Command::Drag { .. } => "DRAG",
            Command::Type(_) => "TYPE",
            Command::PressKey(_) => "PRESS_KEY",
            Command::KeyCombo { .. } => "KEY_COMBO",
            Command::Backspace(_) => "BACKSPACE",
            Command::FocusElement(_) => "FOCUS_ELEMENT",
            Command::Wait(_) => "WAIT",
            Command::OpenApp(_) => "OPEN_APP",
            Command::CloseWindow(_) => "CLOSE_WINDOW",
            Command::MoveWindow { .. } => "MOVE_WINDOW",
            Command::FocusWindow(_) => "FOCUS_WINDOW",
            Command::Finished => "FINISHED",
        }
    }

    /// Commands that need the element resolver before anything is injected.
    pub fn locator(&self) -> Option<&Locator> {
        match self {
            Command::Click(PointerTarget::Element(l))
            | Command::RightClick(PointerTarget::Element(l))
            | Command::DoubleClick(PointerTarget::Element(l))
            | Command::FocusElement(l) => Some(l),
            _ => None,
        }
    }
}

fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.1}", v)
    }
}

fn fmt_target(verb: &str, target: &PointerTarget) -> String {
    match target {
        PointerTarget::Current => verb.to_string(),
        PointerTarget::Point(p) => format!("{}:{}:{}", verb, fmt_number(p.x), fmt_number(p.y)),
        PointerTarget::Element(l) => format!("{}:{}", verb, l),
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb();
        let s = match self {
            Command::MouseMove(p) => format!("{}:{}:{}", verb, fmt_number(p.x), fmt_number(p.y)),
            Command::Click(t) | Command::RightClick(t) | Command::DoubleClick(t) => {
                fmt_target(verb, t)
            }
            Command::Scroll {
                direction,
                amount,
                at,
            } => match at {
                Some(p) => format!(
                    "{}:{}:{}:{}:{}",
                    verb,
                    direction,
                    fmt_number(*amount),
                    fmt_number(p.x),
                    fmt_number(p.y)
                ),
                None => format!("{}:{}:{}", verb, direction, fmt_number(*amount)),
            },
            Command::Drag { from, to } => format!(
                "{}:{}:{}:{}:{}",
                verb,
                fmt_number(from.x),
                fmt_number(from.y),
                fmt_number(to.x),
                fmt_number(to.y)
            ),
            Command::Type(text) => format!("{}:{}", verb, text),
            Command::PressKey(key) => format!("{}:{}", verb, key),
            Command::KeyCombo { modifiers, key } => {
                let mut parts = modifiers.clone();
                parts.push(key.clone());
                format!("{}:{}", verb, parts.join("+"))
            }
            Command::Backspace(n) => format!("{}:{}", verb, n),
            Command::FocusElement(l) => format!("{}:{}", verb, l),
            Command::Wait(ms) => format!("{}:{}", verb, ms),
            Command::OpenApp(id) | Command::CloseWindow(id) | Command::FocusWindow(id) => {
                format!("{}:{}", verb, id)
            }
            Command::MoveWindow { id, to } => {
                format!("{}:{}:{}:{}", verb, id, fmt_number(to.x), fmt_number(to.y))
            }
            Command::Finished => verb.to_string(),
        };
        f.write_str(&s)
    }
}
