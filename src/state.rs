//! Session state store
//!
//! UI-relevant state shared by the viewfinder and controls. State changes only
//! through [`SessionStateStore::dispatch`]; observers follow changes through a
//! watch channel.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Photo,
    #[default]
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub mode: CaptureMode,
    pub is_recording: bool,
    pub zoom: f64,
    pub grid_visible: bool,
    pub controls_visible: bool,
    pub camera_ready: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Video,
            is_recording: false,
            zoom: 1.0,
            grid_visible: false,
            controls_visible: false,
            camera_ready: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StateAction {
    SetMode(CaptureMode),
    SetRecording(bool),
    ToggleControls,
    SetGrid(bool),
    SetZoom(f64),
    SetCameraReady(bool),
    Reset,
}

pub struct SessionStateStore {
    state: watch::Sender<SessionState>,
    last_toggle: Mutex<Option<Instant>>,
    debounce: Duration,
}

impl SessionStateStore {
    pub fn new(debounce: Duration) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state,
            last_toggle: Mutex::new(None),
            debounce,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Apply an action now. Returns whether the state changed.
    pub fn dispatch(&self, action: StateAction) -> bool {
        self.dispatch_at(action, Instant::now())
    }

    /// Apply an action as if it happened at `now`
    pub fn dispatch_at(&self, action: StateAction, now: Instant) -> bool {
        let mut last_toggle = self.last_toggle.lock().unwrap_or_else(PoisonError::into_inner);

        if action == StateAction::ToggleControls {
            if let Some(previous) = *last_toggle {
                if now.saturating_duration_since(previous) < self.debounce {
                    log::debug!("Toggle debounced - too soon after last toggle");
                    return false;
                }
            }
            *last_toggle = Some(now);
        } else if action == StateAction::Reset {
            *last_toggle = None;
        }

        self.state.send_if_modified(|state| {
            let next = reduce(state, &action);
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        })
    }
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

fn reduce(state: &SessionState, action: &StateAction) -> SessionState {
    let mut next = state.clone();
    match action {
        StateAction::SetMode(mode) => next.mode = *mode,
        StateAction::SetRecording(recording) => next.is_recording = *recording,
        StateAction::ToggleControls => next.controls_visible = !state.controls_visible,
        StateAction::SetGrid(visible) => next.grid_visible = *visible,
        StateAction::SetZoom(zoom) => next.zoom = *zoom,
        StateAction::SetCameraReady(ready) => next.camera_ready = *ready,
        StateAction::Reset => next = SessionState::default(),
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let store = SessionStateStore::default();
        let state = store.snapshot();
        assert_eq!(state.mode, CaptureMode::Video);
        assert_eq!(state.zoom, 1.0);
        assert!(!state.controls_visible);
        assert!(!state.camera_ready);
    }

    #[test]
    fn test_toggle_debounce() {
        let store = SessionStateStore::default();
        let t0 = Instant::now();

        assert!(store.dispatch_at(StateAction::ToggleControls, t0));
        assert!(!store.dispatch_at(StateAction::ToggleControls, t0 + Duration::from_millis(120)));
        assert!(store.snapshot().controls_visible);

        assert!(store.dispatch_at(StateAction::ToggleControls, t0 + Duration::from_millis(301)));
        assert!(!store.snapshot().controls_visible);
    }

    #[test]
    fn test_debounce_measured_from_accepted_toggle() {
        let store = SessionStateStore::default();
        let t0 = Instant::now();

        store.dispatch_at(StateAction::ToggleControls, t0);
        store.dispatch_at(StateAction::ToggleControls, t0 + Duration::from_millis(200));
        // 350 ms after the accepted toggle, 150 ms after the ignored one
        assert!(store.dispatch_at(StateAction::ToggleControls, t0 + Duration::from_millis(350)));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let store = SessionStateStore::default();
        store.dispatch(StateAction::SetMode(CaptureMode::Photo));
        store.dispatch(StateAction::SetGrid(true));
        store.dispatch(StateAction::SetZoom(3.0));

        assert!(store.dispatch(StateAction::Reset));
        assert_eq!(store.snapshot(), SessionState::default());
    }

    #[test]
    fn test_unchanged_dispatch_reports_false() {
        let store = SessionStateStore::default();
        assert!(!store.dispatch(StateAction::SetMode(CaptureMode::Video)));
        assert!(store.dispatch(StateAction::SetCameraReady(true)));
    }

    #[tokio::test]
    async fn test_observers_see_changes() {
        let store = SessionStateStore::default();
        let mut rx = store.subscribe();

        store.dispatch(StateAction::SetRecording(true));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_recording);
    }

    #[test]
    fn test_action_serde() {
        let json = serde_json::to_string(&StateAction::SetZoom(2.5)).unwrap();
        assert_eq!(json, r#"{"type":"set_zoom","payload":2.5}"#);
        let action: StateAction = serde_json::from_str(r#"{"type":"set_grid","payload":true}"#).unwrap();
        assert_eq!(action, StateAction::SetGrid(true));
    }
}
