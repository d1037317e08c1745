//! Stream controller: owns the single active camera stream
//!
//! Acquisition walks a ladder of progressively looser constraints. A prior
//! stream is always stopped before the next request so two tracks never hold
//! the hardware at once, and no track is ever stopped under an active
//! recording.

use crate::assert_invariant;
use crate::capture::{CaptureSession, RecordingStatus};
use crate::config::CameraConfig;
use crate::errors::CameraError;
use crate::invariant_ppt::{NO_TEARDOWN_WHILE_RECORDING, SINGLE_ACTIVE_STREAM};
use crate::platform::{self, MediaBackend, TrackCapabilities, VideoConstraints, VideoTrack};
use crate::types::{Artifact, FacingMode, Resolution};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// What to acquire
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireTarget {
    /// Configured facing mode, no specific device
    Default,
    Device(String),
    /// Caller-built first-tier constraints
    Constraints(VideoConstraints),
}

impl From<&str> for AcquireTarget {
    fn from(device_id: &str) -> Self {
        AcquireTarget::Device(device_id.to_string())
    }
}

/// Constraint tier that produced the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintTier {
    Ideal,
    ExactDevice,
    Bare,
}

impl fmt::Display for ConstraintTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintTier::Ideal => write!(f, "ideal"),
            ConstraintTier::ExactDevice => write!(f, "exact-device"),
            ConstraintTier::Bare => write!(f, "bare"),
        }
    }
}

/// The active stream
#[derive(Clone)]
pub struct StreamSession {
    pub id: String,
    pub track: Arc<dyn VideoTrack>,
    pub bound_device_id: String,
    pub constraints: VideoConstraints,
    pub tier: ConstraintTier,
    pub acquired_at: DateTime<Utc>,
}

impl StreamSession {
    pub fn resolution(&self) -> Resolution {
        self.track.settings().resolution
    }

    pub fn frame_rate(&self) -> f64 {
        self.track.settings().frame_rate
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("track", &self.track.id())
            .field("bound_device_id", &self.bound_device_id)
            .field("tier", &self.tier)
            .finish()
    }
}

/// What the viewfinder should display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderTarget {
    None,
    /// The raw camera track
    Stream { device_id: String, track_id: String },
    /// The software zoom surface
    Surface { device_id: String, resolution: Resolution },
}

/// How a device switch treats an in-flight recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwitchPolicy {
    /// Stop and keep the recording
    #[default]
    Finalize,
    /// Discard the recording
    Abandon,
}

/// Result of a device switch
#[derive(Debug)]
pub struct SwitchOutcome {
    pub session: StreamSession,
    /// Recording finalized before the switch
    pub finalized: Option<Artifact>,
    /// Finalization error; the recording was discarded and the switch went ahead
    pub recording_error: Option<CameraError>,
}

struct AcquireGuard<'a>(&'a AtomicBool);

impl Drop for AcquireGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct StreamController {
    backend: Arc<dyn MediaBackend>,
    ideal_resolution: Resolution,
    facing: FacingMode,
    frame_rate: AtomicU32,
    session: RwLock<Option<StreamSession>>,
    acquiring: AtomicBool,
    recording: Arc<AtomicBool>,
    torch: AtomicBool,
    render_tx: watch::Sender<RenderTarget>,
}

impl StreamController {
    pub fn new(backend: Arc<dyn MediaBackend>, config: &CameraConfig) -> Self {
        let (render_tx, _) = watch::channel(RenderTarget::None);
        Self {
            backend,
            ideal_resolution: config.ideal_resolution(),
            facing: config.facing,
            frame_rate: AtomicU32::new(config.frame_rate),
            session: RwLock::new(None),
            acquiring: AtomicBool::new(false),
            recording: Arc::new(AtomicBool::new(false)),
            torch: AtomicBool::new(false),
            render_tx,
        }
    }

    /// Flag raised by the capture session while a recording is active
    pub fn recording_latch(&self) -> Arc<AtomicBool> {
        self.recording.clone()
    }

    fn recording_active(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Constraint ladder for a target
    pub fn constraint_ladder(&self, target: &AcquireTarget) -> Vec<(ConstraintTier, VideoConstraints)> {
        let fps = self.frame_rate.load(Ordering::SeqCst) as f64;
        let mut ladder = Vec::with_capacity(3);

        let device_id = match target {
            AcquireTarget::Default => {
                ladder.push((
                    ConstraintTier::Ideal,
                    VideoConstraints::facing(self.facing)
                        .with_ideal_resolution(self.ideal_resolution)
                        .with_ideal_frame_rate(fps),
                ));
                None
            }
            AcquireTarget::Device(id) => {
                ladder.push((
                    ConstraintTier::Ideal,
                    VideoConstraints::exact_device(id.clone())
                        .with_ideal_resolution(self.ideal_resolution)
                        .with_ideal_frame_rate(fps),
                ));
                Some(id.clone())
            }
            AcquireTarget::Constraints(constraints) => {
                ladder.push((ConstraintTier::Ideal, constraints.clone()));
                constraints.device_id.clone()
            }
        };

        if let Some(id) = device_id {
            ladder.push((ConstraintTier::ExactDevice, VideoConstraints::exact_device(id)));
        }
        ladder.push((ConstraintTier::Bare, VideoConstraints::any()));
        ladder
    }

    /// Acquire a stream, stopping any prior one first
    pub async fn acquire(&self, target: AcquireTarget) -> Result<StreamSession, CameraError> {
        if self.acquiring.swap(true, Ordering::SeqCst) {
            return Err(CameraError::DeviceBusy("another acquisition is in progress".to_string()));
        }
        let _guard = AcquireGuard(&self.acquiring);

        self.teardown().await?;

        let mut last_error: Option<CameraError> = None;
        for (tier, constraints) in self.constraint_ladder(&target) {
            log::debug!("Acquiring stream, tier {} ({})", tier, constraints);
            let backend = self.backend.clone();
            let request = constraints.clone();
            match platform::blocking(move || backend.request_video(&request)).await {
                Ok(track) if track.is_live() => {
                    return self.bind(track, constraints, tier).await;
                }
                Ok(track) => {
                    log::warn!("Tier {} granted a track that is not live, discarding", tier);
                    track.stop();
                    last_error = Some(CameraError::AcquisitionFailed("granted track is not live".to_string()));
                }
                Err(CameraError::PermissionDenied(msg)) => {
                    log::error!("Camera permission denied: {}", msg);
                    return Err(CameraError::PermissionDenied(msg));
                }
                Err(e) => {
                    log::debug!("Tier {} failed: {}", tier, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_else(|| "no constraint tier".to_string());
        log::error!("Stream acquisition failed: {}", reason);
        Err(CameraError::AcquisitionFailed(reason))
    }

    async fn bind(
        &self,
        track: Arc<dyn VideoTrack>,
        constraints: VideoConstraints,
        tier: ConstraintTier,
    ) -> Result<StreamSession, CameraError> {
        let settings = track.settings();
        let session = StreamSession {
            id: uuid::Uuid::new_v4().to_string(),
            bound_device_id: settings.device_id.clone(),
            track,
            constraints,
            tier,
            acquired_at: Utc::now(),
        };

        let mut slot = self.session.write().await;
        assert_invariant!(slot.is_none(), SINGLE_ACTIVE_STREAM, "stream::bind");
        *slot = Some(session.clone());
        drop(slot);

        self.torch.store(false, Ordering::SeqCst);
        self.publish_stream_target(&session);
        log::info!(
            "Stream acquired on {} at {} {}fps (tier {})",
            session.bound_device_id,
            settings.resolution,
            settings.frame_rate,
            tier
        );
        Ok(session)
    }

    /// Stop the active track; refused while recording
    async fn teardown(&self) -> Result<bool, CameraError> {
        let mut slot = self.session.write().await;
        let Some(session) = slot.as_ref() else {
            return Ok(false);
        };

        if self.recording_active() {
            return Err(CameraError::InvalidState(
                "cannot stop the camera while a recording is active".to_string(),
            ));
        }
        assert_invariant!(!self.recording_active(), NO_TEARDOWN_WHILE_RECORDING, "stream::teardown");

        session.track.stop();
        log::debug!("Stream {} on {} torn down", session.id, session.bound_device_id);
        *slot = None;
        drop(slot);

        self.torch.store(false, Ordering::SeqCst);
        self.render_tx.send_replace(RenderTarget::None);
        Ok(true)
    }

    /// Release the active stream. Returns whether one was active.
    pub async fn release(&self) -> Result<bool, CameraError> {
        let released = self.teardown().await?;
        if released {
            log::info!("Stream released");
        }
        Ok(released)
    }

    /// Switch to another camera, ending any recording first
    pub async fn switch_device(
        &self,
        device_id: &str,
        capture: &CaptureSession,
        policy: SwitchPolicy,
    ) -> Result<SwitchOutcome, CameraError> {
        log::info!("Switching to device {}", device_id);
        let mut finalized = None;
        let mut recording_error = None;

        match (capture.recording_status(), policy) {
            (RecordingStatus::Idle, _) => {}
            (RecordingStatus::Recording, SwitchPolicy::Finalize) => {
                log::info!("Finalizing active recording before switching device");
                match capture.stop_recording().await {
                    Ok(artifact) => finalized = Some(artifact),
                    Err(e) => {
                        log::warn!("Recording could not be finalized, discarded: {}", e);
                        recording_error = Some(e);
                    }
                }
            }
            (status, _) => {
                log::warn!("Abandoning recording in state {:?} to switch device", status);
                capture.abandon_recording();
            }
        }

        assert_invariant!(
            !self.recording_active(),
            NO_TEARDOWN_WHILE_RECORDING,
            "stream::switch_device"
        );

        let session = self.acquire(AcquireTarget::Device(device_id.to_string())).await?;
        Ok(SwitchOutcome {
            session,
            finalized,
            recording_error,
        })
    }

    pub async fn current(&self) -> Option<StreamSession> {
        self.session.read().await.clone()
    }

    pub async fn track(&self) -> Option<Arc<dyn VideoTrack>> {
        self.session.read().await.as_ref().map(|s| s.track.clone())
    }

    pub async fn bound_device_id(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.bound_device_id.clone())
    }

    pub async fn is_active(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn capabilities(&self) -> Option<TrackCapabilities> {
        self.track().await.map(|t| t.capabilities())
    }

    /// Ideal frame rate for subsequent acquisitions
    pub fn set_frame_rate(&self, fps: u32) {
        let fps = fps.clamp(1, 240);
        self.frame_rate.store(fps, Ordering::SeqCst);
        log::info!("Frame rate set to {}", fps);
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.load(Ordering::SeqCst)
    }

    pub fn torch_enabled(&self) -> bool {
        self.torch.load(Ordering::SeqCst)
    }

    /// Toggle the torch. Returns the new state.
    pub async fn toggle_torch(&self) -> Result<bool, CameraError> {
        let track = self
            .track()
            .await
            .ok_or_else(|| CameraError::CaptureUnavailable("no active stream".to_string()))?;

        if !track.capabilities().torch {
            return Err(CameraError::Unsupported("torch not supported by this camera".to_string()));
        }

        let enabled = !self.torch_enabled();
        let applied = track.clone();
        match platform::blocking(move || applied.set_torch(enabled)).await {
            Ok(()) => {
                self.torch.store(enabled, Ordering::SeqCst);
                log::info!("Torch {}", if enabled { "on" } else { "off" });
                Ok(enabled)
            }
            Err(e) => {
                log::error!("Torch toggle failed: {}", e);
                self.torch.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn render_target(&self) -> watch::Receiver<RenderTarget> {
        self.render_tx.subscribe()
    }

    pub fn current_render_target(&self) -> RenderTarget {
        self.render_tx.borrow().clone()
    }

    fn publish_stream_target(&self, session: &StreamSession) {
        self.render_tx.send_replace(RenderTarget::Stream {
            device_id: session.bound_device_id.clone(),
            track_id: session.track.id().to_string(),
        });
    }

    /// Point the viewfinder at the software zoom surface, or back at the stream
    pub(crate) async fn set_surface_target(&self, surface: Option<Resolution>) {
        let Some(session) = self.current().await else {
            return;
        };
        match surface {
            Some(resolution) => {
                self.render_tx.send_replace(RenderTarget::Surface {
                    device_id: session.bound_device_id.clone(),
                    resolution,
                });
            }
            None => self.publish_stream_target(&session),
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedBackend;

    fn controller(backend: SimulatedBackend) -> StreamController {
        StreamController::new(Arc::new(backend), &CameraConfig::default())
    }

    #[test]
    fn test_default_ladder_has_no_exact_tier() {
        let stream = controller(SimulatedBackend::phone());
        let ladder = stream.constraint_ladder(&AcquireTarget::Default);
        let tiers: Vec<_> = ladder.iter().map(|(t, _)| *t).collect();
        assert_eq!(tiers, vec![ConstraintTier::Ideal, ConstraintTier::Bare]);
        assert_eq!(ladder[0].1.facing_mode, Some(FacingMode::Environment));
        assert_eq!(ladder[0].1.ideal_resolution, Some(Resolution::new(1920, 1080)));
    }

    #[test]
    fn test_device_ladder() {
        let stream = controller(SimulatedBackend::phone());
        let ladder = stream.constraint_ladder(&AcquireTarget::from("back:2"));
        let tiers: Vec<_> = ladder.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            tiers,
            vec![ConstraintTier::Ideal, ConstraintTier::ExactDevice, ConstraintTier::Bare]
        );
        assert_eq!(ladder[0].1.device_id.as_deref(), Some("back:2"));
        assert_eq!(ladder[0].1.facing_mode, None);
        assert!(ladder[2].1.is_bare());
    }

    #[tokio::test]
    async fn test_acquire_publishes_render_target() {
        let stream = controller(SimulatedBackend::phone());
        let rx = stream.render_target();

        let session = stream.acquire(AcquireTarget::Default).await.unwrap();
        assert_eq!(session.tier, ConstraintTier::Ideal);
        assert!(matches!(&*rx.borrow(), RenderTarget::Stream { .. }));

        assert!(stream.release().await.unwrap());
        assert_eq!(*rx.borrow(), RenderTarget::None);
        assert!(!session.track.is_live());
    }

    #[tokio::test]
    async fn test_teardown_refused_while_recording() {
        let stream = controller(SimulatedBackend::phone());
        stream.acquire(AcquireTarget::Default).await.unwrap();

        stream.recording_latch().store(true, Ordering::SeqCst);
        assert!(matches!(stream.release().await, Err(CameraError::InvalidState(_))));
        assert!(stream.is_active().await);

        stream.recording_latch().store(false, Ordering::SeqCst);
        assert!(stream.release().await.unwrap());
    }

    #[tokio::test]
    async fn test_torch_unsupported_without_capability() {
        let stream = controller(SimulatedBackend::builder().device("cam", "Back Camera").torch(false).build());
        stream.acquire(AcquireTarget::Default).await.unwrap();
        assert!(matches!(stream.toggle_torch().await, Err(CameraError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_torch_toggles() {
        let stream = controller(SimulatedBackend::phone());
        stream.acquire(AcquireTarget::Default).await.unwrap();
        assert!(stream.toggle_torch().await.unwrap());
        assert!(!stream.toggle_torch().await.unwrap());
    }
}
