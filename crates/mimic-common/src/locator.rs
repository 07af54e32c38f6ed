//! Locator descriptors used by `FOCUS_ELEMENT` and the click verbs.
//!
//! A locator is either a bare string or a `;`-separated list of `key=value` pairs:
//!
//! - `#save`, `form > button.primary`, `css=...` : structural selector
//! - `Save` or `text=Save` : visible text (case-insensitive substring)
//! - `tag=button;role=button;icon=trash` : signature filters
//! - `near=Delete` or `near=310,220` : proximity reference (text or point)
//! - `radius=150` : maximum distance from the proximity reference

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    Text(String),
    Point(Point),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Locator {
    pub selector: Option<String>,
    pub text: Option<String>,
    pub tag: Option<String>,
    pub role: Option<String>,
    /// Icon or attribute fingerprint, matched against attribute values and classes.
    pub fingerprint: Option<String>,
    pub near: Option<Anchor>,
    pub radius: Option<f64>,
}

const KEYS: &[&str] = &["css", "text", "tag", "role", "icon", "near", "radius"];

impl Locator {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Default::default()
        }
    }

    pub fn near_point(point: Point, radius: Option<f64>) -> Self {
        Self {
            near: Some(Anchor::Point(point)),
            radius,
            ..Default::default()
        }
    }

    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if let Some(locator) = Self::parse_pairs(input) {
            return locator;
        }
        if let Some(rest) = input.strip_prefix("text=") {
            return Self::text(rest);
        }
        if looks_like_selector(input) {
            return Self::selector(input);
        }
        Self::text(input)
    }

    fn parse_pairs(input: &str) -> Option<Self> {
        let mut locator = Locator::default();
        for pair in input.split(';') {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if !KEYS.contains(&key.as_str()) || value.is_empty() {
                return None;
            }
            match key.as_str() {
                "css" => locator.selector = Some(value.to_string()),
                "text" => locator.text = Some(value.to_string()),
                "tag" => locator.tag = Some(value.to_lowercase()),
                "role" => locator.role = Some(value.to_lowercase()),
                "icon" => locator.fingerprint = Some(value.to_string()),
                "near" => locator.near = Some(parse_anchor(value)),
                "radius" => locator.radius = Some(value.parse().ok()?),
                _ => unreachable!("key checked against KEYS"),
            }
        }
        Some(locator)
    }

    /// True when only a selector was given.
    pub fn is_structural(&self) -> bool {
        self.selector.is_some()
    }

    /// True when the signature strategy has something to match on.
    pub fn has_signature(&self) -> bool {
        self.tag.is_some() || self.role.is_some() || self.fingerprint.is_some() || self.near.is_some()
    }
}

fn parse_anchor(value: &str) -> Anchor {
    let coords = value
        .split_once(',')
        .map(|(x, y)| (x.trim().parse::<f64>(), y.trim().parse::<f64>()));
    match coords {
        Some((Ok(x), Ok(y))) => Anchor::Point(Point::new(x, y)),
        _ => Anchor::Text(value.to_string()),
    }
}

/// Heuristic: does this string read as a CSS/structural selector rather than visible text?
pub fn looks_like_selector(input: &str) -> bool {
    if input.is_empty() || input.contains(char::is_whitespace) && !input.contains('>') {
        return false;
    }
    if input.starts_with(['#', '.', '[']) {
        return true;
    }
    // tag followed by #id, .class, [attr] or a child combinator
    let tag_len = input
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .count();
    if tag_len == 0 || !input.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }
    input[tag_len..]
        .trim_start()
        .starts_with(['#', '.', '[', '>'])
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(s) = &self.selector {
            parts.push(format!("css={}", s));
        }
        if let Some(t) = &self.text {
            parts.push(format!("text={}", t));
        }
        if let Some(t) = &self.tag {
            parts.push(format!("tag={}", t));
        }
        if let Some(r) = &self.role {
            parts.push(format!("role={}", r));
        }
        if let Some(i) = &self.fingerprint {
            parts.push(format!("icon={}", i));
        }
        match &self.near {
            Some(Anchor::Text(t)) => parts.push(format!("near={}", t)),
            Some(Anchor::Point(p)) => parts.push(format!("near={},{}", p.x, p.y)),
            None => {}
        }
        if let Some(r) = self.radius {
            parts.push(format!("radius={}", r));
        }
        f.write_str(&parts.join(";"))
    }
}
