//! Zoom strategy: hardware zoom, lens switching or a software crop
//!
//! Hardware zoom is used when the bound track covers the level. Otherwise the
//! strategy may switch to a better lens, and as a last resort runs a render
//! loop that crops the centre of each live frame and scales it onto an
//! off-screen surface. That surface then becomes the recording source.

use crate::assert_invariant;
use crate::capture::{CaptureSession, RecordingStatus};
use crate::catalog::DeviceCatalog;
use crate::config::ZoomConfig;
use crate::errors::CameraError;
use crate::imaging;
use crate::invariant_ppt::ZOOM_LEVEL_IN_RANGE;
use crate::platform::{self, VideoTrack};
use crate::stream::{StreamController, SwitchPolicy};
use crate::timing::{self, PTSClock};
use crate::types::{Device, LensRole, Resolution, VideoFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomMode {
    Native,
    Software,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    pub level: f64,
    pub mode: ZoomMode,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self {
            level: 1.0,
            mode: ZoomMode::Native,
        }
    }
}

/// Result of [`ZoomStrategy::apply_zoom`]
#[derive(Debug)]
pub struct ZoomOutcome {
    pub state: ZoomState,
    /// Factor applied to the bound lens after its optical zoom
    pub applied_level: f64,
    /// Lens selected for the requested level
    pub switched_to: Option<Device>,
    /// Hardware zoom error that made the strategy fall back to software
    pub degraded: Option<CameraError>,
}

/// Clamp a requested level to `[1, max_level]`; NaN becomes 1
pub fn clamp_level(level: f64, max_level: f64) -> f64 {
    if level.is_nan() {
        return 1.0;
    }
    level.clamp(1.0, max_level.max(1.0))
}

/// Lens role best suited to a requested zoom level
pub fn role_for_level(level: f64, config: &ZoomConfig) -> LensRole {
    if level < config.ultrawide_below {
        LensRole::Ultrawide
    } else if level > config.telephoto_above {
        LensRole::Telephoto
    } else {
        LensRole::Main
    }
}

/// Zoom a lens still has to apply for `level`, given its optical factor.
/// Lenses wider than the main lens are zoomed like the main lens.
pub fn lens_relative_level(level: f64, role: LensRole) -> f64 {
    (level / role.nominal_zoom().max(1.0)).max(1.0)
}

fn hardware_covers(track: &dyn VideoTrack, level: f64) -> bool {
    track.capabilities().zoom.map(|range| range.contains(level)).unwrap_or(false)
}

/// Off-screen surface the software zoom loop draws onto
#[derive(Clone)]
pub struct RenderSurface {
    pub device_id: String,
    pub resolution: Resolution,
    frames: watch::Receiver<Option<Arc<VideoFrame>>>,
}

impl RenderSurface {
    /// Most recently drawn frame
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.frames.borrow().clone()
    }

    /// Wait until the next frame is drawn. `None` once the loop has ended.
    pub async fn next_frame(&mut self) -> Option<Arc<VideoFrame>> {
        self.frames.changed().await.ok()?;
        self.frames.borrow_and_update().clone()
    }
}

/// Render loop drawing centre-cropped frames at the sensor frame rate
pub struct SoftwareZoomRenderer {
    track_id: String,
    device_id: String,
    resolution: Resolution,
    level_tx: watch::Sender<f64>,
    frames: watch::Receiver<Option<Arc<VideoFrame>>>,
    task: JoinHandle<()>,
}

impl SoftwareZoomRenderer {
    pub fn start(track: Arc<dyn VideoTrack>, level: f64, surface: Resolution, clock: PTSClock) -> Self {
        let settings = track.settings();
        let (level_tx, level_rx) = watch::channel(level);
        let (frame_tx, frames) = watch::channel(None);
        let period = timing::frame_interval(settings.frame_rate);

        log::debug!(
            "Software zoom loop on {} at {:?} per frame onto {}",
            settings.device_id,
            period,
            surface
        );

        let task_track = track.clone();
        let task = tokio::spawn(async move {
            let mut ticker = timing::pacing_interval(period);
            loop {
                ticker.tick().await;
                if !task_track.is_live() {
                    log::debug!("Software zoom source stopped, ending loop");
                    break;
                }

                let level = *level_rx.borrow();
                let source = task_track.clone();
                let drawn = platform::blocking(move || {
                    let frame = source.grab_frame()?;
                    imaging::crop_and_scale(&frame, level, surface)
                })
                .await;

                match drawn {
                    Ok(frame) => {
                        frame_tx.send_replace(Some(Arc::new(frame.with_pts(clock.pts()))));
                    }
                    Err(e) => log::debug!("Software zoom frame dropped: {}", e),
                }
            }
        });

        Self {
            track_id: track.id().to_string(),
            device_id: settings.device_id,
            resolution: surface,
            level_tx,
            frames,
            task,
        }
    }

    pub fn set_level(&self, level: f64) {
        self.level_tx.send_replace(level);
    }

    pub fn level(&self) -> f64 {
        *self.level_tx.borrow()
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn surface(&self) -> RenderSurface {
        RenderSurface {
            device_id: self.device_id.clone(),
            resolution: self.resolution,
            frames: self.frames.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SoftwareZoomRenderer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct ZoomStrategy {
    config: ZoomConfig,
    clock: PTSClock,
    state_tx: watch::Sender<ZoomState>,
    renderer: Mutex<Option<SoftwareZoomRenderer>>,
}

impl ZoomStrategy {
    pub fn new(config: ZoomConfig, clock: PTSClock) -> Self {
        let (state_tx, _) = watch::channel(ZoomState::default());
        Self {
            config,
            clock,
            state_tx,
            renderer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ZoomState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ZoomState> {
        self.state_tx.subscribe()
    }

    pub fn config(&self) -> &ZoomConfig {
        &self.config
    }

    fn set_state(&self, level: f64, mode: ZoomMode) -> ZoomState {
        assert_invariant!(
            level >= 1.0 && level <= self.config.max_level.max(1.0),
            ZOOM_LEVEL_IN_RANGE,
            "zoom::set_state"
        );
        let state = ZoomState { level, mode };
        self.state_tx.send_replace(state);
        state
    }

    /// Apply a zoom level to the active stream
    ///
    /// `requested` is relative to the main lens. On a telephoto lens only the
    /// part beyond its optical factor is applied to the track.
    pub async fn apply_zoom(
        &self,
        requested: f64,
        stream: &StreamController,
        catalog: &DeviceCatalog,
        capture: &CaptureSession,
    ) -> Result<ZoomOutcome, CameraError> {
        let level = clamp_level(requested, self.config.max_level);
        let track = stream
            .track()
            .await
            .ok_or_else(|| CameraError::CaptureUnavailable("no active stream to zoom".to_string()))?;

        let bound = stream.bound_device_id().await;
        let bound_role = match &bound {
            Some(id) => catalog.device(id).await.map(|d| d.role).unwrap_or(LensRole::Main),
            None => LensRole::Main,
        };
        let applied = lens_relative_level(level, bound_role);

        let recording = capture.recording_status() != RecordingStatus::Idle;
        let recording_from_surface = recording && self.renderer.lock().await.is_some();

        let mut outcome = ZoomOutcome {
            state: self.state(),
            applied_level: applied,
            switched_to: None,
            degraded: None,
        };

        // A recording drawing from the surface keeps zooming in software
        if recording_from_surface {
            outcome.state = self.software(track, level, applied, stream, true).await;
            return Ok(outcome);
        }

        if hardware_covers(track.as_ref(), applied) {
            let (state, degraded) = self.zoom_lens(track, level, applied, stream).await;
            outcome.state = state;
            outcome.degraded = degraded;
            return Ok(outcome);
        }

        if self.config.auto_lens_switch && !recording && catalog.device_count().await > 1 {
            let role = role_for_level(requested, &self.config);
            if let Some(device) = catalog.find_role(role).await {
                if Some(&device.id) != bound.as_ref() {
                    log::info!("Auto switching to {} lens for zoom {:.2}x", role, requested);
                    self.stop_renderer().await;
                    match stream.switch_device(&device.id, capture, SwitchPolicy::Finalize).await {
                        Ok(switched) => {
                            // The new lens covers part of the request optically
                            let applied = lens_relative_level(level, device.role);
                            let (state, degraded) =
                                self.zoom_lens(switched.session.track, level, applied, stream).await;
                            outcome.state = state;
                            outcome.degraded = degraded;
                            outcome.applied_level = applied;
                            outcome.switched_to = Some(device);
                            return Ok(outcome);
                        }
                        Err(e) => {
                            log::warn!("Lens switch failed, zooming the current lens: {}", e);
                        }
                    }
                }
            }
        }

        // The failed switch may have left no stream behind
        let track = match stream.track().await {
            Some(track) => track,
            None => return Err(CameraError::CaptureUnavailable("no active stream to zoom".to_string())),
        };
        outcome.state = self.software(track, level, applied, stream, false).await;
        Ok(outcome)
    }

    /// Zoom `track` by `applied`, reporting `level`. Hardware zoom when the
    /// track's range covers `applied`, software otherwise.
    async fn zoom_lens(
        &self,
        track: Arc<dyn VideoTrack>,
        level: f64,
        applied: f64,
        stream: &StreamController,
    ) -> (ZoomState, Option<CameraError>) {
        if !hardware_covers(track.as_ref(), applied) {
            return (self.software(track, level, applied, stream, false).await, None);
        }

        let native = track.clone();
        match platform::blocking(move || native.apply_zoom(applied)).await {
            Ok(()) => {
                self.stop_renderer().await;
                stream.set_surface_target(None).await;
                log::debug!("Native zoom {:.2}x ({:.2}x on the lens)", level, applied);
                (self.set_state(level, ZoomMode::Native), None)
            }
            Err(e) => {
                let e = match e {
                    CameraError::ZoomUnsupported(_) => e,
                    other => CameraError::ZoomUnsupported(other.to_string()),
                };
                log::warn!("Native zoom failed, using software zoom: {}", e);
                (self.software(track, level, applied, stream, false).await, Some(e))
            }
        }
    }

    /// Software zoom cropping by `applied` and reporting `level`. A crop of
    /// 1x is the identity and needs no loop unless a recording is drawing
    /// from the surface.
    async fn software(
        &self,
        track: Arc<dyn VideoTrack>,
        level: f64,
        applied: f64,
        stream: &StreamController,
        keep_surface: bool,
    ) -> ZoomState {
        let mut renderer = self.renderer.lock().await;

        if applied <= 1.0 && !keep_surface {
            if renderer.take().is_some() {
                log::debug!("Zoom back to 1x, software loop cancelled");
            }
            drop(renderer);
            stream.set_surface_target(None).await;
            return self.set_state(level, ZoomMode::Native);
        }

        match renderer.as_ref() {
            Some(active) if active.track_id() == track.id() && active.is_running() => active.set_level(applied),
            _ => {
                *renderer = Some(SoftwareZoomRenderer::start(
                    track,
                    applied,
                    self.config.surface_resolution(),
                    self.clock.clone(),
                ));
            }
        }
        drop(renderer);

        stream.set_surface_target(Some(self.config.surface_resolution())).await;
        log::debug!("Software zoom {:.2}x (crop {:.2}x)", level, applied);
        self.set_state(level, ZoomMode::Software)
    }

    /// Crop factor of the running render loop
    pub async fn render_level(&self) -> Option<f64> {
        self.renderer.lock().await.as_ref().map(|r| r.level())
    }

    /// Surface to record from while software zoom is active
    pub async fn recording_source(&self) -> Option<RenderSurface> {
        if self.state().mode != ZoomMode::Software {
            return None;
        }
        self.renderer.lock().await.as_ref().map(|r| r.surface())
    }

    pub async fn is_rendering(&self) -> bool {
        self.renderer
            .lock()
            .await
            .as_ref()
            .map(|r| r.is_running())
            .unwrap_or(false)
    }

    async fn stop_renderer(&self) {
        if self.renderer.lock().await.take().is_some() {
            log::debug!("Software zoom loop cancelled");
        }
    }

    /// Cancel the render loop and return to 1x; used on switch, release and shutdown
    pub async fn reset(&self) {
        self.stop_renderer().await;
        self.set_state(1.0, ZoomMode::Native);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_level() {
        assert_eq!(clamp_level(99.0, 10.0), 10.0);
        assert_eq!(clamp_level(0.5, 10.0), 1.0);
        assert_eq!(clamp_level(f64::NAN, 10.0), 1.0);
        assert_eq!(clamp_level(3.2, 10.0), 3.2);
    }

    #[test]
    fn test_role_for_level() {
        let config = ZoomConfig::default();
        assert_eq!(role_for_level(0.5, &config), LensRole::Ultrawide);
        assert_eq!(role_for_level(0.8, &config), LensRole::Main);
        assert_eq!(role_for_level(2.5, &config), LensRole::Main);
        assert_eq!(role_for_level(3.0, &config), LensRole::Telephoto);
    }

    #[test]
    fn test_lens_relative_level() {
        assert_eq!(lens_relative_level(3.0, LensRole::Telephoto), 1.5);
        assert_eq!(lens_relative_level(1.5, LensRole::Telephoto), 1.0);
        assert_eq!(lens_relative_level(3.0, LensRole::Main), 3.0);
        assert_eq!(lens_relative_level(1.0, LensRole::Ultrawide), 1.0);
        assert_eq!(lens_relative_level(2.0, LensRole::Ultrawide), 2.0);
    }

    #[test]
    fn test_default_state_is_identity() {
        let strategy = ZoomStrategy::new(ZoomConfig::default(), PTSClock::new());
        assert_eq!(strategy.state(), ZoomState::default());
        assert_eq!(strategy.state().mode, ZoomMode::Native);
    }
}
