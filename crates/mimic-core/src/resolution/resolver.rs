//! Locator to element resolution.
//!
//! Strategies run in order and the first hit wins:
//! 1. structural selector, answered by the backend
//! 2. visible text, case-insensitive substring, document order
//! 3. signature: tag/role filter, icon fingerprint, nearest to a reference point

use mimic_common::locator::{Anchor, Locator};
use mimic_common::protocol::{Element, Point, UiSnapshot};
use tracing::debug;

use super::context::ResolutionContext;
use super::result::{ResolutionError, Strategy};
use crate::backend::{Backend, BackendError};

pub struct ElementResolver;

impl ElementResolver {
    /// Resolve a locator against a snapshot. `None` is not an error for callers.
    pub async fn resolve<B: Backend + ?Sized>(
        locator: &Locator,
        snapshot: &UiSnapshot,
        backend: &mut B,
    ) -> Option<Element> {
        match Self::try_resolve(locator, snapshot, backend).await {
            Ok(element) => Some(element),
            Err(e) => {
                debug!("{} (tried: {:?})", e, e.attempted);
                None
            }
        }
    }

    pub async fn try_resolve<B: Backend + ?Sized>(
        locator: &Locator,
        snapshot: &UiSnapshot,
        backend: &mut B,
    ) -> Result<Element, ResolutionError> {
        let ctx = ResolutionContext::new(snapshot);
        let mut attempted = Vec::new();

        if let Some(selector) = &locator.selector {
            attempted.push(Strategy::Selector);
            if let Some(element) = Self::by_selector(selector, &ctx, backend).await {
                debug!("Resolved '{}' by selector to {}", locator, element.id);
                return Ok(element.clone());
            }
        }

        if locator.text.is_some() && locator.near.is_none() {
            attempted.push(Strategy::Text);
            if let Some(element) = ctx.candidates().find(|e| matches_filters(e, locator)) {
                debug!("Resolved '{}' by text to {}", locator, element.id);
                return Ok(element.clone());
            }
        }

        if locator.has_signature() {
            attempted.push(Strategy::Signature);
            if let Some(element) = Self::by_signature(locator, &ctx) {
                debug!("Resolved '{}' by signature to {}", locator, element.id);
                return Ok(element.clone());
            }
        }

        Err(ResolutionError {
            target: locator.to_string(),
            reason: "No rendered element matches".into(),
            attempted,
        })
    }

    async fn by_selector<'a, B: Backend + ?Sized>(
        selector: &str,
        ctx: &ResolutionContext<'a>,
        backend: &mut B,
    ) -> Option<&'a Element> {
        match backend.query_selector(selector).await {
            Ok(Some(id)) => ctx.get_element(id),
            Ok(None) => None,
            Err(BackendError::NotSupported(_)) => {
                // Backend cannot query; compare against the snapshot's recorded selectors.
                ctx.candidates().find(|e| e.selector == selector)
            }
            Err(e) => {
                debug!("Selector query '{}' failed: {}", selector, e);
                None
            }
        }
    }

    fn by_signature<'a>(locator: &Locator, ctx: &ResolutionContext<'a>) -> Option<&'a Element> {
        let (reference, exclude) = match &locator.near {
            None => {
                return ctx.candidates().find(|e| matches_filters(e, locator));
            }
            Some(Anchor::Point(point)) => (*point, None),
            Some(Anchor::Text(text)) => {
                let anchor = ctx.candidates().find(|e| matches_text(e, text))?;
                (anchor.center(), Some(anchor.id))
            }
        };

        nearest(
            ctx.candidates()
                .filter(|e| Some(e.id) != exclude)
                .filter(|e| matches_filters(e, locator)),
            reference,
            locator.radius,
        )
    }
}

/// Closest element by center distance; the first one in document order wins ties.
fn nearest<'a>(
    candidates: impl Iterator<Item = &'a Element>,
    reference: Point,
    radius: Option<f64>,
) -> Option<&'a Element> {
    let mut best: Option<(&Element, f64)> = None;
    for element in candidates {
        let distance = element.center().distance_to(&reference);
        if radius.is_some_and(|r| distance > r) {
            continue;
        }
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((element, distance));
        }
    }
    best.map(|(element, _)| element)
}

fn matches_filters(element: &Element, locator: &Locator) -> bool {
    locator.text.as_ref().is_none_or(|t| matches_text(element, t))
        && locator
            .tag
            .as_ref()
            .is_none_or(|tag| element.element_type.eq_ignore_ascii_case(tag))
        && locator.role.as_ref().is_none_or(|role| matches_role(element, role))
        && locator
            .fingerprint
            .as_ref()
            .is_none_or(|fp| matches_fingerprint(element, fp))
}

fn matches_text(element: &Element, text: &str) -> bool {
    let needle = text.to_lowercase();
    element
        .visible_strings()
        .any(|s| s.to_lowercase().contains(&needle))
}

fn matches_role(element: &Element, role: &str) -> bool {
    element
        .role
        .as_deref()
        .or(element.attributes.get("role").map(String::as_str))
        .is_some_and(|r| r.eq_ignore_ascii_case(role))
}

fn matches_fingerprint(element: &Element, fingerprint: &str) -> bool {
    let needle = fingerprint.to_lowercase();
    element
        .attributes
        .values()
        .any(|v| v.to_lowercase().contains(&needle))
        || element.selector.to_lowercase().contains(&needle)
}
