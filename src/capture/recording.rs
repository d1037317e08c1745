//! Video recording session
//!
//! `idle -> starting -> recording -> stopping -> idle`. A recorder task pulls
//! frames from the source at the frame rate, feeds the encoder and appends a
//! fragment to the buffer every timeslice. The buffer is concatenated into the
//! final artifact once, from the stopping transition.

use super::codec;
use crate::assert_invariant;
use crate::catalog;
use crate::config::{AudioConfig, RecordingConfig};
use crate::errors::CameraError;
use crate::invariant_ppt::{FRAGMENTS_FLUSHED_ONCE, FRAGMENTS_FLUSH_FROM_STOPPING};
use crate::platform::{self, AudioTrack, FragmentEncoder, MediaBackend, RecorderOptions, VideoTrack};
use crate::timing;
use crate::types::{Artifact, ArtifactKind, AudioDevice, Resolution, VideoFrame};
use crate::zoom::RenderSurface;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Where recorded frames come from
#[derive(Clone)]
pub enum RecordingSource {
    /// The raw camera track
    Stream(Arc<dyn VideoTrack>),
    /// The software zoom surface
    Surface(RenderSurface),
}

impl RecordingSource {
    pub fn resolution(&self) -> Resolution {
        match self {
            RecordingSource::Stream(track) => track.settings().resolution,
            RecordingSource::Surface(surface) => surface.resolution,
        }
    }

    pub fn device_id(&self) -> String {
        match self {
            RecordingSource::Stream(track) => track.settings().device_id,
            RecordingSource::Surface(surface) => surface.device_id.clone(),
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self, RecordingSource::Surface(_))
    }
}

/// Summary of a started recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub id: String,
    /// Mime type of the produced stream
    pub mime_type: String,
    /// Negotiated candidate; `None` when the platform default was used
    pub negotiated: Option<String>,
    pub resolution: Resolution,
    pub has_audio: bool,
    pub from_surface: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct FragmentBuffer {
    fragments: Vec<Bytes>,
    flushed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn abandoned_while_starting() -> CameraError {
    CameraError::InvalidState("recording was abandoned while starting".to_string())
}

/// State shared between the session and its recorder task
struct Shared {
    status: watch::Sender<RecordingStatus>,
    latch: Arc<AtomicBool>,
    buffer: Mutex<FragmentBuffer>,
    last_error: Mutex<Option<CameraError>>,
    /// Bumped on every reset so a start suspended across one can tell
    resets: AtomicU64,
}

impl Shared {
    fn status(&self) -> RecordingStatus {
        *self.status.borrow()
    }

    /// Move `from -> to`; false when the status was not `from`
    fn transition(&self, from: RecordingStatus, to: RecordingStatus) -> bool {
        self.status.send_if_modified(|status| {
            if *status == from {
                *status = to;
                true
            } else {
                false
            }
        })
    }

    /// `Starting -> Recording`, unless the start was reset in the meantime
    fn commit_start(&self, epoch: u64) -> bool {
        self.status.send_if_modified(|status| {
            if *status == RecordingStatus::Starting && self.resets.load(Ordering::SeqCst) == epoch {
                *status = RecordingStatus::Recording;
                true
            } else {
                false
            }
        })
    }

    fn start_cancelled(&self, epoch: u64) -> bool {
        self.status() != RecordingStatus::Starting || self.resets.load(Ordering::SeqCst) != epoch
    }

    fn append(&self, fragment: Bytes) {
        if fragment.is_empty() {
            return;
        }
        lock(&self.buffer).fragments.push(fragment);
    }

    /// Return to idle with fragments discarded
    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        *lock(&self.buffer) = FragmentBuffer::default();
        self.status.send_replace(RecordingStatus::Idle);
        self.latch.store(false, Ordering::SeqCst);
    }

    /// Recorder died on its own while recording
    fn fail(&self, error: CameraError) {
        if self.transition(RecordingStatus::Recording, RecordingStatus::Idle) {
            log::error!("Recording failed: {}", error);
            *lock(&self.buffer) = FragmentBuffer::default();
            *lock(&self.last_error) = Some(error);
            self.latch.store(false, Ordering::SeqCst);
        }
    }
}

struct ActiveRecording {
    info: RecordingInfo,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), CameraError>>,
    audio: Option<Arc<dyn AudioTrack>>,
}

impl ActiveRecording {
    fn release_audio(&self) {
        if let Some(audio) = &self.audio {
            audio.stop();
        }
    }

    /// Stop the recorder without flushing
    fn cancel(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.task.abort();
        self.release_audio();
    }
}

/// Photo and video capture against the active stream
pub struct CaptureSession {
    backend: Arc<dyn MediaBackend>,
    config: RecordingConfig,
    audio_config: AudioConfig,
    photo_fallback: Resolution,
    jpeg_quality: u8,
    clock: timing::PTSClock,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveRecording>>,
    preferred_codec: Mutex<Option<String>>,
    microphone_enabled: AtomicBool,
    audio_device: Mutex<Option<AudioDevice>>,
}

impl CaptureSession {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        config: &crate::config::CineCraftConfig,
        recording_latch: Arc<AtomicBool>,
        clock: timing::PTSClock,
    ) -> Self {
        let (status, _) = watch::channel(RecordingStatus::Idle);
        Self {
            backend,
            config: config.recording.clone(),
            audio_config: config.audio.clone(),
            photo_fallback: config.camera.fallback_photo_resolution(),
            jpeg_quality: config.storage.jpeg_quality,
            clock,
            shared: Arc::new(Shared {
                status,
                latch: recording_latch,
                buffer: Mutex::new(FragmentBuffer::default()),
                last_error: Mutex::new(None),
                resets: AtomicU64::new(0),
            }),
            active: Mutex::new(None),
            preferred_codec: Mutex::new(config.recording.preferred_codec.clone()),
            microphone_enabled: AtomicBool::new(config.audio.enabled),
            audio_device: Mutex::new(None),
        }
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.shared.status()
    }

    pub fn is_recording(&self) -> bool {
        self.recording_status() == RecordingStatus::Recording
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RecordingStatus> {
        self.shared.status.subscribe()
    }

    pub fn current_recording(&self) -> Option<RecordingInfo> {
        lock(&self.active).as_ref().map(|a| a.info.clone())
    }

    /// Number of fragments buffered for the current recording
    pub fn buffered_fragments(&self) -> usize {
        lock(&self.shared.buffer).fragments.len()
    }

    pub fn set_preferred_codec(&self, codec: Option<String>) {
        log::info!("Video codec set to: {}", codec.as_deref().unwrap_or("(platform default)"));
        *lock(&self.preferred_codec) = codec;
    }

    pub fn preferred_codec(&self) -> Option<String> {
        lock(&self.preferred_codec).clone()
    }

    pub fn set_microphone_enabled(&self, enabled: bool) {
        self.microphone_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn microphone_enabled(&self) -> bool {
        self.microphone_enabled.load(Ordering::SeqCst)
    }

    pub fn select_audio_device(&self, device: Option<AudioDevice>) {
        if let Some(device) = &device {
            log::info!("Microphone selected: {} ({})", device.label, device.kind.as_str());
        }
        *lock(&self.audio_device) = device;
    }

    pub fn audio_device(&self) -> Option<AudioDevice> {
        lock(&self.audio_device).clone()
    }

    /// Capture a still from `track`
    pub async fn capture_photo(&self, track: Option<Arc<dyn VideoTrack>>) -> Result<Artifact, CameraError> {
        let track = track.ok_or_else(|| CameraError::CaptureUnavailable("no active stream".to_string()))?;
        super::snapshot::capture_photo(track, self.photo_fallback, self.jpeg_quality).await
    }

    async fn open_microphone(&self) -> Option<Arc<dyn AudioTrack>> {
        if !self.microphone_enabled() {
            return None;
        }
        let constraints = catalog::audio_constraints_for(self.audio_device().as_ref(), &self.audio_config);
        let backend = self.backend.clone();
        match platform::blocking(move || backend.request_audio(&constraints)).await {
            Ok(track) => {
                log::info!("Recording audio from {}", track.device_id());
                Some(track)
            }
            Err(e) => {
                log::warn!("Audio unavailable, recording video only: {}", e);
                None
            }
        }
    }

    fn create_encoder(&self, options: &mut RecorderOptions) -> Result<Box<dyn FragmentEncoder>, CameraError> {
        match self.backend.create_encoder(options) {
            Ok(encoder) => Ok(encoder),
            Err(e) if options.mime_type.is_some() => {
                log::warn!("Preferred MIME init failed, retrying with platform default: {}", e);
                options.mime_type = None;
                self.backend.create_encoder(options)
            }
            Err(e) => Err(e),
        }
    }

    /// Start recording from `source`
    pub async fn start_recording(&self, source: RecordingSource) -> Result<RecordingInfo, CameraError> {
        self.discard_stale();
        if !self.shared.transition(RecordingStatus::Idle, RecordingStatus::Starting) {
            return Err(CameraError::InvalidState(format!(
                "recording already {:?}",
                self.recording_status()
            )));
        }
        let epoch = self.shared.resets.load(Ordering::SeqCst);
        self.shared.latch.store(true, Ordering::SeqCst);
        *lock(&self.shared.last_error) = None;
        *lock(&self.shared.buffer) = FragmentBuffer::default();

        let audio = self.open_microphone().await;
        if self.shared.start_cancelled(epoch) {
            if let Some(audio) = &audio {
                audio.stop();
            }
            log::warn!("Recording abandoned while opening the microphone");
            return Err(abandoned_while_starting());
        }

        let resolution = source.resolution();
        let frame_rate = match &source {
            RecordingSource::Stream(track) => track.settings().frame_rate,
            RecordingSource::Surface(_) => 0.0,
        };
        let negotiated = codec::negotiate(self.backend.as_ref(), self.preferred_codec().as_deref());
        let mut options = RecorderOptions {
            mime_type: negotiated.clone(),
            video_bits_per_second: self.config.video_bits_per_second,
            audio_bits_per_second: self.config.audio_bits_per_second,
            resolution,
            frame_rate: if frame_rate > 0.0 { frame_rate } else { 30.0 },
            has_audio: audio.is_some(),
        };

        let encoder = match self.create_encoder(&mut options) {
            Ok(encoder) => encoder,
            Err(e) => {
                if let Some(audio) = &audio {
                    audio.stop();
                }
                if !self.shared.start_cancelled(epoch) {
                    self.shared.reset();
                }
                log::error!("Recorder could not be created: {}", e);
                return Err(CameraError::RecordingFailed(format!("encoder unavailable: {}", e)));
            }
        };

        let info = RecordingInfo {
            id: uuid::Uuid::new_v4().to_string(),
            mime_type: encoder.mime_type().to_string(),
            negotiated: options.mime_type.clone(),
            resolution,
            has_audio: audio.is_some(),
            from_surface: source.is_surface(),
            started_at: Utc::now(),
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_recorder(
            source,
            encoder,
            audio.clone(),
            self.shared.clone(),
            stop_rx,
            timing::frame_interval(options.frame_rate),
            Duration::from_millis(self.config.timeslice_ms),
            self.clock.clone(),
        ));

        let active = ActiveRecording {
            info: info.clone(),
            stop_tx: Some(stop_tx),
            task,
            audio,
        };
        {
            // Held across the commit so an abandon either sees this recording or
            // has already reset the status
            let mut slot = lock(&self.active);
            if !self.shared.commit_start(epoch) {
                drop(slot);
                active.cancel();
                log::warn!("Recording {} abandoned while starting", info.id);
                return Err(abandoned_while_starting());
            }
            *slot = Some(active);
        }

        log::info!(
            "Recording {} started: {} at {}{}{}",
            info.id,
            info.mime_type,
            info.resolution,
            if info.has_audio { " with audio" } else { "" },
            if info.from_surface { " from zoom surface" } else { "" }
        );
        Ok(info)
    }

    /// Stop the recording and concatenate its fragments into one artifact
    pub async fn stop_recording(&self) -> Result<Artifact, CameraError> {
        if !self.shared.transition(RecordingStatus::Recording, RecordingStatus::Stopping) {
            self.discard_stale();
            return match lock(&self.shared.last_error).take() {
                Some(e) => Err(CameraError::RecordingFailed(e.to_string())),
                None => Err(CameraError::NoActiveRecording),
            };
        }

        let Some(mut active) = lock(&self.active).take() else {
            self.shared.reset();
            return Err(CameraError::NoActiveRecording);
        };

        if let Some(stop) = active.stop_tx.take() {
            let _ = stop.send(());
        }
        let joined = (&mut active.task).await;
        active.release_audio();

        let outcome = match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(CameraError::RecordingFailed(format!("recorder task ended abnormally: {}", e))),
        };
        if let Err(e) = outcome {
            log::error!("Recording {} failed while stopping: {}", active.info.id, e);
            self.shared.reset();
            return Err(match e {
                CameraError::RecordingFailed(_) => e,
                other => CameraError::RecordingFailed(other.to_string()),
            });
        }

        let data = {
            let mut buffer = lock(&self.shared.buffer);
            assert_invariant!(
                self.shared.status() == RecordingStatus::Stopping,
                FRAGMENTS_FLUSH_FROM_STOPPING,
                "recording::stop"
            );
            assert_invariant!(!buffer.flushed, FRAGMENTS_FLUSHED_ONCE, "recording::stop");

            let total = buffer.fragments.iter().map(Bytes::len).sum();
            let mut data = BytesMut::with_capacity(total);
            for fragment in buffer.fragments.drain(..) {
                data.extend_from_slice(&fragment);
            }
            buffer.flushed = true;
            data.freeze()
        };

        self.shared.reset();

        if data.is_empty() {
            log::warn!("Recording {} produced no data", active.info.id);
        }
        log::info!(
            "Recording {} finalized: {} bytes of {}",
            active.info.id,
            data.len(),
            active.info.mime_type
        );
        Ok(Artifact::new(
            ArtifactKind::Video,
            active.info.mime_type.clone(),
            data,
            active.info.resolution,
        ))
    }

    /// Discard the active recording. Returns whether one was active.
    pub fn abandon_recording(&self) -> bool {
        let was_status = self.recording_status() != RecordingStatus::Idle;
        // Reset first: a start still in flight then fails its commit
        self.shared.reset();

        let active = lock(&self.active).take();
        let was_active = was_status || active.is_some();
        if let Some(active) = active {
            log::warn!("Recording {} abandoned, fragments discarded", active.info.id);
            active.cancel();
        }
        was_active
    }

    /// Clean up after a recorder that failed on its own
    fn discard_stale(&self) {
        if self.recording_status() != RecordingStatus::Idle {
            return;
        }
        if let Some(active) = lock(&self.active).take() {
            active.cancel();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.active).take() {
            active.task.abort();
            active.release_audio();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_recorder(
    source: RecordingSource,
    mut encoder: Box<dyn FragmentEncoder>,
    audio: Option<Arc<dyn AudioTrack>>,
    shared: Arc<Shared>,
    mut stop_rx: oneshot::Receiver<()>,
    frame_period: Duration,
    timeslice: Duration,
    clock: timing::PTSClock,
) -> Result<(), CameraError> {
    let mut frame_tick = timing::pacing_interval(frame_period);
    let mut slice_tick = timing::pacing_interval(timeslice);
    slice_tick.reset();
    let mut last_surface_pts: Option<f64> = None;

    let result: Result<(), CameraError> = async {
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = frame_tick.tick() => {
                    let frame: Option<VideoFrame> = match &source {
                        RecordingSource::Stream(track) => {
                            if !track.is_live() {
                                return Err(CameraError::RecordingFailed("camera track ended".to_string()));
                            }
                            let track = track.clone();
                            Some(platform::blocking(move || track.grab_frame()).await?)
                        }
                        RecordingSource::Surface(surface) => match surface.latest() {
                            Some(frame) if last_surface_pts != Some(frame.pts) => {
                                last_surface_pts = Some(frame.pts);
                                Some((*frame).clone())
                            }
                            _ => None,
                        },
                    };
                    let samples = audio.as_ref().map(|a| a.read_samples()).unwrap_or_default();
                    let pts = clock.pts();
                    encoder = encode_step(encoder, frame.map(|f| f.with_pts(pts)), samples).await?;
                }
                _ = slice_tick.tick() => {
                    let (returned, fragment) = flush_step(encoder).await?;
                    encoder = returned;
                    shared.append(fragment);
                }
            }
        }

        // Trailing data emitted after the stop request
        let (_, fragment) = flush_step(encoder).await?;
        shared.append(fragment);
        Ok(())
    }
    .await;

    if let Err(e) = &result {
        shared.fail(e.clone());
    }
    result
}

async fn encode_step(
    mut encoder: Box<dyn FragmentEncoder>,
    frame: Option<VideoFrame>,
    samples: Vec<f32>,
) -> Result<Box<dyn FragmentEncoder>, CameraError> {
    if frame.is_none() && samples.is_empty() {
        return Ok(encoder);
    }
    platform::blocking(move || {
        if let Some(frame) = &frame {
            encoder.push_video(frame)?;
        }
        if !samples.is_empty() {
            encoder.push_audio(&samples)?;
        }
        Ok(encoder)
    })
    .await
}

async fn flush_step(mut encoder: Box<dyn FragmentEncoder>) -> Result<(Box<dyn FragmentEncoder>, Bytes), CameraError> {
    platform::blocking(move || {
        let fragment = encoder.flush()?;
        Ok((encoder, fragment))
    })
    .await
}
