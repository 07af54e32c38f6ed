//! Host UI event dispatch.
//!
//! Listeners register per event type and phase. On dispatch every
//! [`Phase::Capture`] listener runs before any [`Phase::Bubble`] listener, so
//! an application handler that stops propagation can never hide an event
//! from a capture listener.

use mimic_common::protocol::MouseButton;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Click,
    KeyDown,
    Wheel,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::Click => "click",
            EventType::KeyDown => "keydown",
            EventType::Wheel => "wheel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capture,
    Bubble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

/// An ancestor of an event target, outermost last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// The element an event was delivered to, as the host reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTarget {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub ancestors: Vec<NodeInfo>,
}

fn default_click_count() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Click {
        x: f64,
        y: f64,
        #[serde(default)]
        button: MouseButton,
        #[serde(default = "default_click_count")]
        click_count: u8,
        #[serde(default)]
        target: Option<EventTarget>,
    },
    KeyDown {
        key: String,
        #[serde(default)]
        target: Option<EventTarget>,
    },
    Wheel {
        delta_y: f64,
        x: f64,
        y: f64,
        #[serde(default)]
        target: Option<EventTarget>,
    },
}

impl HostEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            HostEvent::Click { .. } => EventType::Click,
            HostEvent::KeyDown { .. } => EventType::KeyDown,
            HostEvent::Wheel { .. } => EventType::Wheel,
        }
    }

    pub fn target(&self) -> Option<&EventTarget> {
        match self {
            HostEvent::Click { target, .. }
            | HostEvent::KeyDown { target, .. }
            | HostEvent::Wheel { target, .. } => target.as_ref(),
        }
    }
}

type Listener = Arc<dyn Fn(&HostEvent) -> Propagation + Send + Sync>;

struct Registration {
    id: u64,
    event_type: EventType,
    phase: Phase,
    listener: Listener,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    registrations: Vec<Registration>,
    registration_denied: bool,
    recording: bool,
}

#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host policy switch: while set, every `listen` call is refused.
    pub fn set_registration_denied(&self, denied: bool) {
        self.lock().registration_denied = denied;
    }

    /// Register a listener. It stays registered until the returned handle is dropped.
    pub fn listen<F>(
        &self,
        event_type: EventType,
        phase: Phase,
        listener: F,
    ) -> Result<ListenerHandle, CaptureError>
    where
        F: Fn(&HostEvent) -> Propagation + Send + Sync + 'static,
    {
        let mut state = self.lock();
        if state.registration_denied {
            return Err(CaptureError::ListenerDenied(event_type));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.registrations.push(Registration {
            id,
            event_type,
            phase,
            listener: Arc::new(listener),
        });
        Ok(ListenerHandle {
            id,
            state: Arc::downgrade(&self.state),
        })
    }

    /// Deliver an event. Returns `Propagation::Stop` if some listener stopped it.
    pub fn dispatch(&self, event: &HostEvent) -> Propagation {
        let event_type = event.event_type();
        let (capture, bubble): (Vec<_>, Vec<_>) = {
            let state = self.lock();
            state
                .registrations
                .iter()
                .filter(|r| r.event_type == event_type)
                .map(|r| (r.phase, Arc::clone(&r.listener)))
                .partition(|(phase, _)| *phase == Phase::Capture)
        };

        let mut propagation = Propagation::Continue;
        for (_, listener) in &capture {
            if listener(event) == Propagation::Stop {
                propagation = Propagation::Stop;
            }
        }
        if propagation == Propagation::Stop {
            return propagation;
        }

        for (_, listener) in &bubble {
            if listener(event) == Propagation::Stop {
                return Propagation::Stop;
            }
        }
        Propagation::Continue
    }

    /// Claim the host's single recording slot. `None` while another claim is alive.
    pub fn claim_recording(&self) -> Option<RecordingClaim> {
        let mut state = self.lock();
        if state.recording {
            return None;
        }
        state.recording = true;
        Some(RecordingClaim {
            state: Arc::downgrade(&self.state),
        })
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }

    pub fn listener_count(&self) -> usize {
        self.lock().registrations.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unregisters its listener when dropped.
pub struct ListenerHandle {
    id: u64,
    state: Weak<Mutex<BusState>>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.registrations.retain(|r| r.id != self.id);
        }
    }
}

/// Holds the bus's recording slot; releases it when dropped.
pub struct RecordingClaim {
    state: Weak<Mutex<BusState>>,
}

impl Drop for RecordingClaim {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().unwrap_or_else(PoisonError::into_inner).recording = false;
        }
    }
}
