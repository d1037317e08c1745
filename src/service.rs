//! Camera service: the context object tying the capture core together
//!
//! Owns the catalog, the stream controller, the zoom strategy, the capture
//! session, the UI state store and the storage collaborator, and sequences
//! the user-facing operations across them.

use crate::capture::{CaptureSession, RecordingInfo, RecordingSource, RecordingStatus};
use crate::catalog::DeviceCatalog;
use crate::config::CineCraftConfig;
use crate::errors::CameraError;
use crate::platform::{self, DeviceMonitor, MediaBackend};
use crate::state::{SessionStateStore, StateAction};
use crate::storage::{self, ArtifactStore, FileSystemStore, SavedArtifact, StorageLocation};
use crate::stream::{AcquireTarget, RenderTarget, StreamController, StreamSession, SwitchPolicy};
use crate::timing::PTSClock;
use crate::types::{Artifact, AudioDevice, Device, LensRole};
use crate::zoom::{ZoomOutcome, ZoomStrategy};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// An artifact and where it was saved
#[derive(Debug, Clone)]
pub struct SavedCapture {
    pub artifact: Artifact,
    pub saved: SavedArtifact,
}

/// Result of [`CameraService::switch_device`]
#[derive(Debug)]
pub struct SwitchReport {
    pub session: StreamSession,
    /// Recording finalized and saved before the switch
    pub saved_recording: Option<SavedCapture>,
    /// Why an in-flight recording was lost, if it was
    pub recording_error: Option<CameraError>,
}

pub struct CameraService {
    backend: Arc<dyn MediaBackend>,
    config: CineCraftConfig,
    catalog: Arc<DeviceCatalog>,
    stream: StreamController,
    zoom: ZoomStrategy,
    capture: CaptureSession,
    state: SessionStateStore,
    store: Arc<dyn ArtifactStore>,
    locations: Vec<StorageLocation>,
    selected_location: Mutex<String>,
    monitor: Arc<DeviceMonitor>,
    watcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CameraService {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        config: CineCraftConfig,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, CameraError> {
        config.validate().map_err(CameraError::ConfigError)?;

        let locations = storage::default_locations(Path::new(&config.storage.output_directory));
        if !locations.iter().any(|l| l.id == config.storage.default_location) {
            return Err(CameraError::ConfigError(format!(
                "unknown storage location {}",
                config.storage.default_location
            )));
        }

        let clock = PTSClock::new();
        let stream = StreamController::new(backend.clone(), &config.camera);
        let capture = CaptureSession::new(backend.clone(), &config, stream.recording_latch(), clock.clone());

        log::info!("Camera service created on {} backend", backend.name());
        Ok(Self {
            catalog: Arc::new(DeviceCatalog::new(backend.clone(), config.camera.facing)),
            zoom: ZoomStrategy::new(config.zoom.clone(), clock),
            state: SessionStateStore::new(Duration::from_millis(config.interface.controls_debounce_ms)),
            monitor: Arc::new(DeviceMonitor::new(
                backend.clone(),
                Duration::from_millis(config.camera.device_poll_interval_ms),
            )),
            selected_location: Mutex::new(config.storage.default_location.clone()),
            watcher: tokio::sync::Mutex::new(None),
            backend,
            stream,
            capture,
            store,
            locations,
            config,
        })
    }

    /// Service saving into `config.storage.output_directory`
    pub fn with_filesystem_store(backend: Arc<dyn MediaBackend>, config: CineCraftConfig) -> Result<Self, CameraError> {
        Self::new(backend, config, Arc::new(FileSystemStore::new()))
    }

    pub fn config(&self) -> &CineCraftConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn stream(&self) -> &StreamController {
        &self.stream
    }

    pub fn zoom(&self) -> &ZoomStrategy {
        &self.zoom
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    pub fn state(&self) -> &SessionStateStore {
        &self.state
    }

    pub fn monitor(&self) -> &DeviceMonitor {
        &self.monitor
    }

    pub fn render_target(&self) -> watch::Receiver<RenderTarget> {
        self.stream.render_target()
    }

    /// Open the default camera, then catalog the devices and move to the main
    /// lens when the default camera is another one
    pub async fn initialize(&self) -> Result<StreamSession, CameraError> {
        log::info!("Initializing camera");
        let mut session = match self.stream.acquire(AcquireTarget::Default).await {
            Ok(session) => session,
            Err(e) => {
                self.state.dispatch(StateAction::SetCameraReady(false));
                return Err(e);
            }
        };
        self.state.dispatch(StateAction::SetCameraReady(true));

        let devices = self.enumerate().await?;

        if let Some(main) = devices.iter().find(|d| d.role == LensRole::Main) {
            if main.id != session.bound_device_id {
                log::info!("Switching to main camera {}", main.display_label);
                session = self.switch_device(&main.id).await?.session;
            }
        }

        Ok(session)
    }

    /// Catalog cameras and microphones
    ///
    /// While a stream is open labels are already visible, so no throwaway
    /// stream is opened.
    pub async fn enumerate(&self) -> Result<Vec<Device>, CameraError> {
        let devices = if self.stream.is_active().await {
            self.catalog.refresh().await?
        } else {
            self.catalog.enumerate().await?
        };

        match self.catalog.enumerate_audio().await {
            Ok(mics) => {
                if self.capture.audio_device().is_none() {
                    if let Some(preferred) = crate::catalog::preferred_audio_device(&mics) {
                        self.capture.select_audio_device(Some(preferred.clone()));
                    }
                }
            }
            Err(e) => log::warn!("Microphone enumeration failed: {}", e),
        }

        Ok(devices)
    }

    /// Switch to another camera, finalizing and saving an in-flight recording
    pub async fn switch_device(&self, device_id: &str) -> Result<SwitchReport, CameraError> {
        if self.catalog.device_count().await > 0 && self.catalog.device(device_id).await.is_none() {
            return Err(CameraError::DeviceNotFound(device_id.to_string()));
        }

        let was_recording = self.capture.recording_status() != RecordingStatus::Idle;
        let result = self
            .stream
            .switch_device(device_id, &self.capture, SwitchPolicy::Finalize)
            .await;

        self.zoom.reset().await;
        self.state.dispatch(StateAction::SetZoom(1.0));
        if was_recording {
            self.state.dispatch(StateAction::SetRecording(false));
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Failed to switch to {}: {}", device_id, e);
                self.state.dispatch(StateAction::SetCameraReady(false));
                return Err(e);
            }
        };
        self.state.dispatch(StateAction::SetCameraReady(true));

        let mut recording_error = outcome.recording_error;
        let mut saved_recording = None;
        if let Some(artifact) = outcome.finalized {
            match self.save(&artifact).await {
                Ok(saved) => saved_recording = Some(SavedCapture { artifact, saved }),
                Err(e) => {
                    log::error!("Recording finalized before the switch could not be saved: {}", e);
                    recording_error = Some(e);
                }
            }
        }

        Ok(SwitchReport {
            session: outcome.session,
            saved_recording,
            recording_error,
        })
    }

    /// Switch to the first camera classified with `role`
    pub async fn switch_lens(&self, role: LensRole) -> Result<SwitchReport, CameraError> {
        let device = self
            .catalog
            .find_role(role)
            .await
            .ok_or_else(|| CameraError::DeviceNotFound(format!("no {} lens", role)))?;
        self.switch_device(&device.id).await
    }

    pub async fn set_zoom(&self, level: f64) -> Result<ZoomOutcome, CameraError> {
        let outcome = self
            .zoom
            .apply_zoom(level, &self.stream, &self.catalog, &self.capture)
            .await?;
        if let Some(error) = &outcome.degraded {
            log::warn!("{}", error);
        }
        self.state.dispatch(StateAction::SetZoom(outcome.state.level));
        Ok(outcome)
    }

    /// Capture a photo and save it as `IMG_<timestamp>.jpg`
    pub async fn take_photo(&self) -> Result<SavedCapture, CameraError> {
        let artifact = self.capture.capture_photo(self.stream.track().await).await?;
        let saved = self.save(&artifact).await?;
        Ok(SavedCapture { artifact, saved })
    }

    /// Start recording the stream, or the zoom surface while software zoom is active
    pub async fn start_recording(&self) -> Result<RecordingInfo, CameraError> {
        let track = self
            .stream
            .track()
            .await
            .ok_or_else(|| CameraError::CaptureUnavailable("no active stream".to_string()))?;

        let source = match self.zoom.recording_source().await {
            Some(surface) => RecordingSource::Surface(surface),
            None => RecordingSource::Stream(track),
        };

        let info = self.capture.start_recording(source).await?;
        self.state.dispatch(StateAction::SetRecording(true));
        Ok(info)
    }

    /// Finalize the recording and save it as `VID_<timestamp>.<ext>`
    pub async fn stop_recording(&self) -> Result<SavedCapture, CameraError> {
        let result = self.capture.stop_recording().await;
        self.state.dispatch(StateAction::SetRecording(false));

        let artifact = result?;
        let saved = self.save(&artifact).await?;
        Ok(SavedCapture { artifact, saved })
    }

    pub async fn toggle_torch(&self) -> Result<bool, CameraError> {
        self.stream.toggle_torch().await
    }

    /// Record from `device_id`, or the platform default microphone with `None`
    pub async fn select_audio_device(&self, device_id: Option<&str>) -> Result<(), CameraError> {
        let device: Option<AudioDevice> = match device_id {
            Some(id) => Some(
                self.catalog
                    .audio_device(id)
                    .await
                    .ok_or_else(|| CameraError::DeviceNotFound(id.to_string()))?,
            ),
            None => None,
        };
        self.capture.select_audio_device(device);
        Ok(())
    }

    pub fn set_microphone_enabled(&self, enabled: bool) {
        log::info!("Microphone {}", if enabled { "enabled" } else { "disabled" });
        self.capture.set_microphone_enabled(enabled);
    }

    pub fn set_preferred_codec(&self, codec: Option<String>) {
        self.capture.set_preferred_codec(codec);
    }

    /// Ideal frame rate for the next stream acquisition
    pub fn set_frame_rate(&self, fps: u32) {
        self.stream.set_frame_rate(fps);
    }

    pub fn locations(&self) -> &[StorageLocation] {
        &self.locations
    }

    pub fn selected_location(&self) -> StorageLocation {
        let id = self.selected_location.lock().unwrap_or_else(PoisonError::into_inner).clone();
        self.locations
            .iter()
            .find(|l| l.id == id)
            .or_else(|| self.locations.first())
            .cloned()
            .unwrap_or_else(|| StorageLocation::new(id, "Captures", &self.config.storage.output_directory))
    }

    /// Save future artifacts to the location `id`
    pub fn select_location(&self, id: &str) -> Result<StorageLocation, CameraError> {
        let location = self
            .locations
            .iter()
            .find(|l| l.id == id)
            .ok_or_else(|| CameraError::StorageWriteFailed(format!("unknown storage location {}", id)))?;
        if !location.available {
            return Err(CameraError::StorageWriteFailed(format!("{} is not available", location.name)));
        }

        *self.selected_location.lock().unwrap_or_else(PoisonError::into_inner) = id.to_string();
        log::info!("Storage location: {}", location.name);
        Ok(location.clone())
    }

    async fn save(&self, artifact: &Artifact) -> Result<SavedArtifact, CameraError> {
        let location = self.selected_location();
        let filename = storage::filename_for(artifact);
        let store = self.store.clone();
        let artifact = artifact.clone();
        platform::blocking(move || store.save(&artifact, &filename, &location)).await
    }

    /// Refresh the catalog whenever a device is plugged, unplugged or changed
    pub async fn watch_device_changes(&self) -> Result<(), CameraError> {
        let mut watcher = self.watcher.lock().await;
        if watcher.is_some() {
            return Ok(());
        }

        self.monitor.start_monitoring().await?;

        let monitor = self.monitor.clone();
        let catalog = self.catalog.clone();
        *watcher = Some(tokio::spawn(async move {
            while let Some(event) = monitor.wait_for_event().await {
                log::info!("Device change detected: {:?}", event);
                if let Err(e) = catalog.refresh().await {
                    log::warn!("Camera re-enumeration failed: {}", e);
                }
                if let Err(e) = catalog.enumerate_audio().await {
                    log::warn!("Microphone re-enumeration failed: {}", e);
                }
            }
        }));
        Ok(())
    }

    pub async fn stop_watching(&self) {
        if let Some(task) = self.watcher.lock().await.take() {
            task.abort();
        }
        self.monitor.stop_monitoring().await;
    }

    /// Finalize any recording, release the camera and reset the UI state
    pub async fn shutdown(&self) -> Result<Option<SavedCapture>, CameraError> {
        log::info!("Shutting down camera service");
        self.stop_watching().await;

        let mut saved = None;
        if self.capture.recording_status() != RecordingStatus::Idle {
            match self.stop_recording().await {
                Ok(capture) => saved = Some(capture),
                Err(e) => {
                    log::warn!("Recording lost on shutdown: {}", e);
                    self.capture.abandon_recording();
                }
            }
        }

        self.zoom.reset().await;
        self.stream.release().await?;
        self.state.dispatch(StateAction::Reset);
        Ok(saved)
    }
}

impl Drop for CameraService {
    fn drop(&mut self) {
        if let Some(task) = self.watcher.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, SimulatedBackend};

    fn service(sim: &SimulatedBackend) -> (CameraService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = CameraService::new(Arc::new(sim.clone()), CineCraftConfig::default(), store.clone()).unwrap();
        (service, store)
    }

    #[test]
    fn test_unknown_default_location_rejected() {
        let mut config = CineCraftConfig::default();
        config.storage.default_location = "sdcard".to_string();
        let result = CameraService::new(
            Arc::new(SimulatedBackend::phone()),
            config,
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(result, Err(CameraError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_initialize_marks_camera_ready() {
        let sim = SimulatedBackend::phone();
        let (service, _) = service(&sim);

        let session = service.initialize().await.unwrap();
        assert_eq!(session.bound_device_id, "back:0");
        assert!(service.state().snapshot().camera_ready);
        assert_eq!(service.catalog().device_count().await, 3);
        assert_eq!(service.capture().audio_device().map(|d| d.id), Some("mic:0".to_string()));
    }

    #[tokio::test]
    async fn test_photo_saved_to_selected_location() {
        let sim = SimulatedBackend::phone();
        let (service, store) = service(&sim);
        service.initialize().await.unwrap();
        service.select_location("downloads").unwrap();

        let photo = service.take_photo().await.unwrap();
        assert!(!photo.artifact.is_empty());
        assert_eq!(photo.saved.location_id, "downloads");
        assert!(photo.saved.filename.starts_with("IMG_"));
        assert!(photo.saved.filename.ends_with(".jpg"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let sim = SimulatedBackend::phone();
        let (service, store) = service(&sim);
        service.initialize().await.unwrap();
        store.set_failing(true);

        let result = service.take_photo().await;
        assert!(matches!(result, Err(CameraError::StorageWriteFailed(_))));
    }

    #[tokio::test]
    async fn test_unknown_location_rejected() {
        let sim = SimulatedBackend::phone();
        let (service, _) = service(&sim);
        assert!(service.select_location("cloud").is_err());
        assert_eq!(service.selected_location().id, "dcim");
    }

    #[tokio::test]
    async fn test_switch_lens_resets_zoom() {
        let sim = SimulatedBackend::phone();
        let (service, _) = service(&sim);
        service.initialize().await.unwrap();

        let report = service.switch_lens(LensRole::Ultrawide).await.unwrap();
        assert_eq!(report.session.bound_device_id, "back:2");
        assert_eq!(service.zoom().state().level, 1.0);
        assert_eq!(service.state().snapshot().zoom, 1.0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_camera() {
        let sim = SimulatedBackend::phone();
        let (service, _) = service(&sim);
        service.initialize().await.unwrap();

        assert!(service.shutdown().await.unwrap().is_none());
        assert_eq!(sim.live_video_tracks(), 0);
        assert!(!service.state().snapshot().camera_ready);
    }
}
