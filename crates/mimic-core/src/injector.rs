//! Synthesizes the platform event sequences behind each user-level action.
//!
//! Staged actions (typing, drags, double clicks) are awaited event by event;
//! a method returns only after its last event has been dispatched.

use mimic_common::protocol::{MouseButton, Point, SyntheticEvent};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, BackendError};
use crate::config::ReplayConfig;

pub struct InputInjector {
    config: ReplayConfig,
    cursor: Point,
    cancel: CancellationToken,
}

impl InputInjector {
    pub fn new(config: ReplayConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cursor: Point::default(),
            cancel,
        }
    }

    pub fn cursor(&self) -> Point {
        self.cursor
    }

    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    pub async fn move_to<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        at: Point,
    ) -> Result<(), BackendError> {
        backend.dispatch(SyntheticEvent::PointerMove { at }).await?;
        self.cursor = at;
        Ok(())
    }

    /// Single or double click with the given button.
    pub async fn click<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        at: Point,
        target: Option<u32>,
        button: MouseButton,
        click_count: u8,
    ) -> Result<(), BackendError> {
        self.checkpoint()?;
        self.move_to(backend, at).await?;

        if button == MouseButton::Right {
            self.press_button(backend, at, target, button).await?;
            return backend
                .dispatch(SyntheticEvent::ContextMenu { at, target })
                .await;
        }

        for count in 1..=click_count.max(1) {
            if count > 1 {
                self.pause(self.config.double_click_gap_ms).await?;
            }
            self.press_button(backend, at, target, button).await?;
            backend
                .dispatch(SyntheticEvent::Click {
                    at,
                    button,
                    click_count: count,
                    target,
                })
                .await?;
        }
        Ok(())
    }

    async fn press_button<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        at: Point,
        target: Option<u32>,
        button: MouseButton,
    ) -> Result<(), BackendError> {
        backend
            .dispatch(SyntheticEvent::PointerDown { at, button, target })
            .await?;
        backend
            .dispatch(SyntheticEvent::PointerUp { at, button, target })
            .await
    }

    pub async fn scroll<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        at: Point,
        delta_x: f64,
        delta_y: f64,
        target: Option<u32>,
    ) -> Result<(), BackendError> {
        self.checkpoint()?;
        self.move_to(backend, at).await?;
        backend
            .dispatch(SyntheticEvent::Wheel {
                at,
                delta_x,
                delta_y,
                target,
            })
            .await
    }

    /// Press at `from`, move through `drag_steps` interpolated points, release at `to`.
    pub async fn drag<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        from: Point,
        to: Point,
    ) -> Result<(), BackendError> {
        self.checkpoint()?;
        self.move_to(backend, from).await?;
        backend
            .dispatch(SyntheticEvent::PointerDown {
                at: from,
                button: MouseButton::Left,
                target: None,
            })
            .await?;

        let steps = self.config.drag_steps.max(1);
        for step in 1..=steps {
            let t = f64::from(step) / f64::from(steps);
            let at = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
            self.move_to(backend, at).await?;
            self.pause(self.config.drag_step_delay_ms).await?;
        }

        backend
            .dispatch(SyntheticEvent::PointerUp {
                at: to,
                button: MouseButton::Left,
                target: None,
            })
            .await
    }

    /// Type character by character into the focused element.
    pub async fn type_text<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        text: &str,
    ) -> Result<(), BackendError> {
        let target = backend.active_element().await?;
        for c in text.chars() {
            self.checkpoint()?;
            if c == '\n' {
                self.key_stroke(backend, "Enter", &[], target).await?;
            } else {
                self.key_stroke(backend, &c.to_string(), &[], target).await?;
            }
            self.pause(self.config.type_delay_ms).await?;
        }
        Ok(())
    }

    /// Discrete key press, optionally holding modifiers.
    pub async fn press_key<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: &str,
        modifiers: &[String],
    ) -> Result<(), BackendError> {
        self.checkpoint()?;
        let target = backend.active_element().await?;
        let modifiers: Vec<String> = modifiers.iter().map(|m| modifier_key(m)).collect();

        for (held, modifier) in modifiers.iter().enumerate() {
            backend
                .dispatch(SyntheticEvent::KeyDown {
                    key: modifier.clone(),
                    modifiers: modifiers[..held].to_vec(),
                    target,
                })
                .await?;
        }

        self.key_stroke(backend, key, &modifiers, target).await?;

        for (held, modifier) in modifiers.iter().enumerate().rev() {
            backend
                .dispatch(SyntheticEvent::KeyUp {
                    key: modifier.clone(),
                    modifiers: modifiers[..held].to_vec(),
                    target,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn backspace<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        count: u32,
    ) -> Result<(), BackendError> {
        let target = backend.active_element().await?;
        for _ in 0..count {
            self.checkpoint()?;
            self.key_stroke(backend, "Backspace", &[], target).await?;
            self.pause(self.config.type_delay_ms).await?;
        }
        Ok(())
    }

    /// Wait for `ms`, returning early with `Cancelled` if the token fires.
    pub async fn pause(&self, ms: u64) -> Result<(), BackendError> {
        if ms == 0 {
            return self.checkpoint();
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
            _ = self.cancel.cancelled() => Err(BackendError::Cancelled),
        }
    }

    pub fn checkpoint(&self) -> Result<(), BackendError> {
        if self.cancel.is_cancelled() {
            Err(BackendError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn key_stroke<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        key: &str,
        modifiers: &[String],
        target: Option<u32>,
    ) -> Result<(), BackendError> {
        backend
            .dispatch(SyntheticEvent::KeyDown {
                key: key.to_string(),
                modifiers: modifiers.to_vec(),
                target,
            })
            .await?;

        if produces_text(key, modifiers) {
            backend
                .dispatch(SyntheticEvent::Input {
                    text: key.to_string(),
                    target,
                })
                .await?;
        }

        backend
            .dispatch(SyntheticEvent::KeyUp {
                key: key.to_string(),
                modifiers: modifiers.to_vec(),
                target,
            })
            .await
    }
}

/// A key inserts text when it is one printable character and only Shift is held.
fn produces_text(key: &str, modifiers: &[String]) -> bool {
    let mut chars = key.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_control())
        && modifiers.iter().all(|m| m == "Shift")
}

fn modifier_key(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "ctrl" | "control" => "Control".to_string(),
        "alt" | "option" => "Alt".to_string(),
        "shift" => "Shift".to_string(),
        "meta" | "cmd" | "command" | "super" | "win" => "Meta".to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produces_text() {
        assert!(produces_text("a", &[]));
        assert!(produces_text("A", &["Shift".to_string()]));
        assert!(!produces_text("s", &["Control".to_string()]));
        assert!(!produces_text("Enter", &[]));
    }

    #[test]
    fn test_modifier_names_are_canonical() {
        assert_eq!(modifier_key("ctrl"), "Control");
        assert_eq!(modifier_key("Cmd"), "Meta");
        assert_eq!(modifier_key("Hyper"), "Hyper");
    }
}
