use chrono::Utc;
use mimic_common::action::{ActionPayload, ElementDescriptor, ObservationSession, RawAction};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::CaptureError;
use super::bus::{
    EventBus, EventTarget, EventType, HostEvent, ListenerHandle, Phase, Propagation, RecordingClaim,
};
use crate::config::RecorderConfig;

#[derive(Default)]
struct RecorderState {
    active: bool,
    session: Option<ObservationSession>,
    started_at: Option<Instant>,
    last_offset_ms: u64,
}

/// Decides whether an event target belongs to the recorder's own UI.
#[derive(Debug, Clone)]
struct SurfaceFilter {
    ids: Vec<String>,
    marker: String,
}

impl SurfaceFilter {
    fn is_own_surface(&self, target: Option<&EventTarget>) -> bool {
        let Some(target) = target else {
            return false;
        };
        let owned = |id: Option<&String>, attributes: &std::collections::HashMap<String, String>| {
            id.is_some_and(|id| self.ids.contains(id)) || attributes.contains_key(&self.marker)
        };
        owned(target.id.as_ref(), &target.attributes)
            || target
                .ancestors
                .iter()
                .any(|node| owned(node.id.as_ref(), &node.attributes))
    }
}

/// Captures pointer clicks, key-downs and wheel events from an [`EventBus`]
/// into one [`ObservationSession`] at a time.
///
/// Only one session may be recorded per bus: every recorder attached to the
/// same host shares the bus's recording slot.
pub struct Recorder {
    bus: EventBus,
    config: RecorderConfig,
    state: Arc<Mutex<RecorderState>>,
    handles: Vec<ListenerHandle>,
    claim: Option<RecordingClaim>,
}

impl Recorder {
    pub fn new(bus: EventBus, config: RecorderConfig) -> Self {
        Self {
            bus,
            config,
            state: Arc::new(Mutex::new(RecorderState::default())),
            handles: Vec::new(),
            claim: None,
        }
    }

    /// Begin a session. Calling this while a session is active, here or in another
    /// recorder on the same bus, leaves that session untouched.
    pub fn start(&mut self, task_name: &str, attempt_number: u32) -> Result<(), CaptureError> {
        if let Some(session) = lock(&self.state).session.as_ref() {
            warn!(
                "Recording already active for '{}' (attempt {}), ignoring start",
                session.task_name, session.attempt_number
            );
            return Ok(());
        }
        let Some(claim) = self.bus.claim_recording() else {
            warn!(
                "Another recorder is active on this host, ignoring start of '{}'",
                task_name
            );
            return Ok(());
        };

        let filter = SurfaceFilter {
            ids: self.config.own_surface_ids.clone(),
            marker: self.config.own_surface_marker.clone(),
        };

        // Handles registered before a failure drop here and unregister themselves.
        let mut handles = Vec::with_capacity(3);
        for event_type in [EventType::Click, EventType::KeyDown, EventType::Wheel] {
            let state = Arc::clone(&self.state);
            let filter = filter.clone();
            let text_cap = self.config.text_cap;
            handles.push(self.bus.listen(event_type, Phase::Capture, move |event| {
                capture(&state, &filter, text_cap, event);
                Propagation::Continue
            })?);
        }

        let mut state = lock(&self.state);
        state.active = true;
        state.session = Some(ObservationSession::new(task_name, attempt_number));
        state.started_at = Some(Instant::now());
        state.last_offset_ms = 0;
        drop(state);

        self.handles = handles;
        self.claim = Some(claim);
        info!("Recording '{}' attempt {}", task_name, attempt_number);
        Ok(())
    }

    /// Seal and return the active session. Listeners are removed even when no session is active.
    pub fn stop(&mut self) -> Option<ObservationSession> {
        self.handles.clear();
        self.claim = None;

        let mut state = lock(&self.state);
        state.active = false;
        state.started_at = None;
        let mut session = state.session.take()?;
        session.end_time = Some(Utc::now());
        info!(
            "Stopped recording '{}': {} actions",
            session.task_name,
            session.actions.len()
        );
        Some(session)
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).active
    }

    /// Number of actions captured so far in the active session.
    pub fn action_count(&self) -> usize {
        lock(&self.state)
            .session
            .as_ref()
            .map_or(0, |s| s.actions.len())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

fn lock(state: &Mutex<RecorderState>) -> MutexGuard<'_, RecorderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn capture(state: &Mutex<RecorderState>, filter: &SurfaceFilter, text_cap: usize, event: &HostEvent) {
    if filter.is_own_surface(event.target()) {
        debug!("Skipping {} on recorder surface", event.event_type());
        return;
    }

    let mut state = lock(state);
    if !state.active {
        return;
    }
    let Some(started_at) = state.started_at else {
        return;
    };

    let elapsed = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
    let offset_ms = elapsed.max(state.last_offset_ms);
    state.last_offset_ms = offset_ms;

    let action = to_raw_action(event, offset_ms, text_cap);
    if let Some(session) = state.session.as_mut() {
        session.actions.push(action);
    }
}

fn describe(target: &EventTarget, text_cap: usize) -> ElementDescriptor {
    ElementDescriptor::new(
        &target.tag,
        target.id.as_deref(),
        &target.classes,
        &target.text,
        &target.attributes,
        text_cap,
    )
}

fn to_raw_action(event: &HostEvent, offset_ms: u64, text_cap: usize) -> RawAction {
    match event {
        HostEvent::Click {
            x,
            y,
            button,
            click_count,
            target,
        } => RawAction {
            offset_ms,
            payload: ActionPayload::Pointer {
                x: *x,
                y: *y,
                button: *button,
                click_count: *click_count,
                target: target.as_ref().map(|t| describe(t, text_cap)),
            },
        },
        HostEvent::KeyDown { key, .. } => RawAction::key(offset_ms, key),
        HostEvent::Wheel { delta_y, x, y, .. } => RawAction::wheel(offset_ms, *delta_y, *x, *y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::bus::NodeInfo;
    use std::collections::HashMap;

    fn recorder() -> Recorder {
        Recorder::new(EventBus::new(), RecorderConfig::default())
    }

    fn click_on(target: EventTarget) -> HostEvent {
        HostEvent::Click {
            x: 5.0,
            y: 5.0,
            button: Default::default(),
            click_count: 1,
            target: Some(target),
        }
    }

    #[test]
    fn test_events_inside_own_surface_are_skipped() {
        let mut rec = recorder();
        rec.start("task", 1).unwrap();

        let inside_panel = EventTarget {
            tag: "button".into(),
            text: "Stop".into(),
            ancestors: vec![NodeInfo {
                id: Some("mimic-panel".into()),
                attributes: HashMap::new(),
            }],
            ..Default::default()
        };
        let marked = EventTarget {
            tag: "span".into(),
            attributes: HashMap::from([("data-mimic-ui".into(), "1".into())]),
            ..Default::default()
        };
        let app_button = EventTarget {
            tag: "button".into(),
            text: "Save".into(),
            ..Default::default()
        };

        rec.bus().dispatch(&click_on(inside_panel));
        rec.bus().dispatch(&click_on(marked));
        rec.bus().dispatch(&click_on(app_button));

        let session = rec.stop().unwrap();
        assert_eq!(session.actions.len(), 1);
    }

    #[test]
    fn test_second_recorder_on_same_bus_is_refused() {
        let bus = EventBus::new();
        let mut first = Recorder::new(bus.clone(), RecorderConfig::default());
        let mut second = Recorder::new(bus.clone(), RecorderConfig::default());

        first.start("task", 1).unwrap();
        second.start("task", 2).unwrap();
        assert!(!second.is_recording());

        bus.dispatch(&HostEvent::KeyDown {
            key: "a".into(),
            target: None,
        });
        assert!(second.stop().is_none());
        assert_eq!(first.stop().unwrap().actions.len(), 1);

        // The slot is free again once the first recorder stops.
        second.start("task", 2).unwrap();
        assert!(second.is_recording());
        assert!(bus.is_recording());
    }

    #[test]
    fn test_stop_without_session() {
        let mut rec = recorder();
        assert!(rec.stop().is_none());
        assert_eq!(rec.bus().listener_count(), 0);
    }

    #[test]
    fn test_failed_start_leaves_no_listeners() {
        let bus = EventBus::new();
        bus.set_registration_denied(true);
        let mut rec = Recorder::new(bus.clone(), RecorderConfig::default());

        assert!(rec.start("task", 1).is_err());
        assert!(!rec.is_recording());
        assert_eq!(bus.listener_count(), 0);
    }
}
