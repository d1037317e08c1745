//! Simulated media backend
//!
//! Behaves like a phone's media API: camera labels stay hidden until a camera
//! has been opened once, the camera hardware is exclusive, and every open and
//! stop is written to an event log so tests can check ordering.

use super::synthetic_data::{synthetic_audio_samples, synthetic_video_frame};
use crate::errors::CameraError;
use crate::imaging;
use crate::permissions::PermissionStatus;
use crate::platform::{
    AudioConstraints, AudioTrack, FragmentEncoder, MediaBackend, RecorderOptions, TrackCapabilities,
    TrackSettings, VideoConstraints, VideoTrack, ZoomRange,
};
use crate::types::{FacingMode, MediaKind, RawDeviceInfo, Resolution, VideoFrame};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Container produced when the recorder asks for the platform default
pub const SIM_DEFAULT_MIME: &str = "video/webm";

const SIM_SUPPORTED_MIMES: &[&str] = &[
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
];

/// Audio samples per channel returned by each read
const SIM_AUDIO_BLOCK: usize = 480;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Something the simulated hardware did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    VideoOpened { track_id: String, device_id: String },
    VideoStopped { track_id: String, device_id: String },
    AudioOpened { track_id: String, device_id: String },
    AudioStopped { track_id: String, device_id: String },
    EncoderCreated { mime_type: String },
}

#[derive(Debug, Clone)]
struct SimConfig {
    resolution: Resolution,
    frame_rate: f64,
    torch: bool,
    hardware_zoom: Option<ZoomRange>,
    broken_zoom: bool,
    still_capture: bool,
    still_resolution: Option<Resolution>,
    audio_latency: Duration,
    exclusive: bool,
    reject_ideal: bool,
    reject_exact: bool,
    supported_mimes: Vec<String>,
    broken_encoders: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(320, 240),
            frame_rate: 30.0,
            torch: true,
            hardware_zoom: None,
            broken_zoom: false,
            still_capture: false,
            still_resolution: None,
            audio_latency: Duration::ZERO,
            exclusive: true,
            reject_ideal: false,
            reject_exact: false,
            supported_mimes: SIM_SUPPORTED_MIMES.iter().map(|m| m.to_string()).collect(),
            broken_encoders: Vec::new(),
        }
    }
}

struct SimState {
    config: SimConfig,
    devices: Mutex<Vec<RawDeviceInfo>>,
    permission: Mutex<PermissionStatus>,
    labels_unlocked: AtomicBool,
    video_error: Mutex<Option<CameraError>>,
    /// Live camera tracks, track id to device id
    live_video: Mutex<HashMap<String, String>>,
    events: Mutex<Vec<SimEvent>>,
    next_track: AtomicU64,
    applied_zoom: Mutex<Vec<f64>>,
}

impl SimState {
    fn log(&self, event: SimEvent) {
        log::debug!("sim: {:?}", event);
        lock(&self.events).push(event);
    }

    fn track_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_track.fetch_add(1, Ordering::SeqCst))
    }

    fn is_connected(&self, device_id: &str) -> bool {
        lock(&self.devices).iter().any(|d| d.id == device_id)
    }

    fn permission(&self) -> PermissionStatus {
        *lock(&self.permission)
    }

    fn select_camera(&self, constraints: &VideoConstraints) -> Result<RawDeviceInfo, CameraError> {
        let devices = lock(&self.devices);
        let cameras: Vec<&RawDeviceInfo> = devices.iter().filter(|d| d.kind == MediaKind::VideoInput).collect();

        if let Some(id) = &constraints.device_id {
            return cameras
                .iter()
                .find(|d| &d.id == id)
                .map(|d| (*d).clone())
                .ok_or_else(|| CameraError::DeviceNotFound(format!("OverconstrainedError: no camera {}", id)));
        }

        let by_facing = match constraints.facing_mode {
            Some(FacingMode::User) => cameras.iter().find(|d| is_front(&d.label)),
            Some(FacingMode::Environment) => cameras.iter().find(|d| !is_front(&d.label)),
            None => None,
        };
        by_facing
            .or_else(|| cameras.first())
            .map(|d| (*d).clone())
            .ok_or_else(|| CameraError::DeviceNotFound("NotFoundError: no camera available".to_string()))
    }
}

fn is_front(label: &str) -> bool {
    let lower = label.to_lowercase();
    ["front", "user", "selfie"].iter().any(|k| lower.contains(k))
}

/// In-process stand-in for a phone's media API
#[derive(Clone)]
pub struct SimulatedBackend {
    state: Arc<SimState>,
}

impl SimulatedBackend {
    pub fn builder() -> SimulatedBackendBuilder {
        SimulatedBackendBuilder::default()
    }

    /// Three back lenses, a front camera and a built-in microphone
    pub fn phone() -> Self {
        Self::builder()
            .device("back:0", "Back Camera")
            .device("front:1", "Front Camera")
            .device("back:2", "Back Ultra Wide Camera")
            .device("back:3", "Back Telephoto Camera")
            .audio_device("mic:0", "Built-in Mic")
            .build()
    }

    /// Connect a device
    pub fn plug(&self, device: RawDeviceInfo) {
        log::debug!("sim: plugged {}", device.id);
        lock(&self.state.devices).push(device);
    }

    /// Disconnect a device; its live tracks end
    pub fn unplug(&self, device_id: &str) {
        log::debug!("sim: unplugged {}", device_id);
        lock(&self.state.devices).retain(|d| d.id != device_id);
        lock(&self.state.live_video).retain(|_, device| device != device_id);
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        *lock(&self.state.permission) = status;
    }

    /// Make every camera request fail with `error`
    pub fn set_video_error(&self, error: Option<CameraError>) {
        *lock(&self.state.video_error) = error;
    }

    pub fn events(&self) -> Vec<SimEvent> {
        lock(&self.state.events).clone()
    }

    pub fn clear_events(&self) {
        lock(&self.state.events).clear();
    }

    /// Devices of every camera opened so far, in order
    pub fn opened_cameras(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::VideoOpened { device_id, .. } => Some(device_id),
                _ => None,
            })
            .collect()
    }

    pub fn live_video_tracks(&self) -> usize {
        lock(&self.state.live_video).len()
    }

    /// Hardware zoom levels applied so far
    pub fn applied_zoom(&self) -> Vec<f64> {
        lock(&self.state.applied_zoom).clone()
    }
}

impl MediaBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn permission_status(&self) -> PermissionStatus {
        self.state.permission()
    }

    fn list_devices(&self) -> Result<Vec<RawDeviceInfo>, CameraError> {
        let labels_visible = self.state.permission().is_granted() || self.state.labels_unlocked.load(Ordering::SeqCst);
        let devices = lock(&self.state.devices).clone();
        Ok(devices
            .into_iter()
            .map(|mut d| {
                if !labels_visible {
                    d.label.clear();
                }
                d
            })
            .collect())
    }

    fn request_video(&self, constraints: &VideoConstraints) -> Result<Arc<dyn VideoTrack>, CameraError> {
        let state = &self.state;
        state.permission().ensure_not_denied()?;

        if let Some(error) = lock(&state.video_error).clone() {
            return Err(error);
        }
        if state.config.reject_ideal && constraints.has_preferences() {
            return Err(CameraError::AcquisitionFailed(format!(
                "OverconstrainedError: {}",
                constraints
            )));
        }
        if state.config.reject_exact && constraints.device_id.is_some() {
            return Err(CameraError::AcquisitionFailed(format!(
                "OverconstrainedError: {}",
                constraints
            )));
        }

        let device = state.select_camera(constraints)?;
        let track_id = state.track_id("video");
        {
            let mut live = lock(&state.live_video);
            if state.config.exclusive {
                if let Some((held, _)) = live.iter().next() {
                    return Err(CameraError::DeviceBusy(format!(
                        "NotReadableError: camera held by track {}",
                        held
                    )));
                }
            }
            live.insert(track_id.clone(), device.id.clone());
        }

        state.labels_unlocked.store(true, Ordering::SeqCst);
        state.log(SimEvent::VideoOpened {
            track_id: track_id.clone(),
            device_id: device.id.clone(),
        });

        Ok(Arc::new(SimVideoTrack {
            id: track_id,
            device_id: device.id,
            resolution: state.config.resolution,
            frame_rate: state.config.frame_rate,
            state: state.clone(),
            live: AtomicBool::new(true),
            frames: AtomicU64::new(0),
            torch: AtomicBool::new(false),
        }))
    }

    fn request_audio(&self, constraints: &AudioConstraints) -> Result<Arc<dyn AudioTrack>, CameraError> {
        let state = &self.state;
        state.permission().ensure_not_denied()?;

        let device = {
            let devices = lock(&state.devices);
            let mut mics = devices.iter().filter(|d| d.kind == MediaKind::AudioInput);
            match &constraints.device_id {
                Some(id) => mics.find(|d| &d.id == id).cloned(),
                None => mics.next().cloned(),
            }
        }
        .ok_or_else(|| CameraError::DeviceNotFound("NotFoundError: no microphone".to_string()))?;

        if !state.config.audio_latency.is_zero() {
            std::thread::sleep(state.config.audio_latency);
        }

        let track_id = state.track_id("audio");
        state.log(SimEvent::AudioOpened {
            track_id: track_id.clone(),
            device_id: device.id.clone(),
        });

        Ok(Arc::new(SimAudioTrack {
            id: track_id,
            device_id: device.id,
            sample_rate: constraints.sample_rate,
            channels: constraints.channel_count,
            state: state.clone(),
            live: AtomicBool::new(true),
            blocks: AtomicU64::new(0),
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.state.config.supported_mimes.iter().any(|m| m == mime_type)
    }

    fn create_encoder(&self, options: &RecorderOptions) -> Result<Box<dyn FragmentEncoder>, CameraError> {
        let mime_type = options.mime_type.clone().unwrap_or_else(|| SIM_DEFAULT_MIME.to_string());

        if options.mime_type.is_some() && !self.is_type_supported(&mime_type) {
            return Err(CameraError::RecordingFailed(format!("NotSupportedError: {}", mime_type)));
        }
        if self.state.config.broken_encoders.iter().any(|m| *m == mime_type) {
            return Err(CameraError::RecordingFailed(format!(
                "encoder for {} failed to initialize",
                mime_type
            )));
        }

        self.state.log(SimEvent::EncoderCreated {
            mime_type: mime_type.clone(),
        });
        Ok(Box::new(SimEncoder {
            mime_type,
            seq: 0,
            pending: Vec::new(),
        }))
    }
}

#[derive(Default)]
pub struct SimulatedBackendBuilder {
    devices: Vec<RawDeviceInfo>,
    permission: Option<PermissionStatus>,
    config: SimConfig,
}

impl SimulatedBackendBuilder {
    pub fn device(mut self, id: &str, label: &str) -> Self {
        self.devices.push(RawDeviceInfo::video(id, label));
        self
    }

    pub fn audio_device(mut self, id: &str, label: &str) -> Self {
        self.devices.push(RawDeviceInfo::audio(id, label));
        self
    }

    pub fn raw_device(mut self, device: RawDeviceInfo) -> Self {
        self.devices.push(device);
        self
    }

    pub fn permission(mut self, status: PermissionStatus) -> Self {
        self.permission = Some(status);
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.config.resolution = Resolution::new(width, height);
        self
    }

    pub fn frame_rate(mut self, fps: f64) -> Self {
        self.config.frame_rate = fps;
        self
    }

    pub fn torch(mut self, supported: bool) -> Self {
        self.config.torch = supported;
        self
    }

    pub fn hardware_zoom(mut self, min: f64, max: f64) -> Self {
        self.config.hardware_zoom = Some(ZoomRange::new(min, max));
        self
    }

    /// Report a hardware zoom range but fail every zoom request
    pub fn broken_zoom(mut self) -> Self {
        self.config.broken_zoom = true;
        self
    }

    /// Offer a high-quality still API on camera tracks
    pub fn still_capture(mut self, enabled: bool) -> Self {
        self.config.still_capture = enabled;
        self
    }

    /// Still API photos at their own sensor resolution
    pub fn still_resolution(mut self, width: u32, height: u32) -> Self {
        self.config.still_capture = true;
        self.config.still_resolution = Some(Resolution::new(width, height));
        self
    }

    /// Microphone requests block this long before answering
    pub fn audio_latency(mut self, latency: Duration) -> Self {
        self.config.audio_latency = latency;
        self
    }

    /// Allow several camera tracks at once
    pub fn shared_hardware(mut self) -> Self {
        self.config.exclusive = false;
        self
    }

    /// Fail requests carrying format or facing preferences
    pub fn reject_ideal(mut self) -> Self {
        self.config.reject_ideal = true;
        self
    }

    /// Fail requests naming a device
    pub fn reject_exact(mut self) -> Self {
        self.config.reject_exact = true;
        self
    }

    pub fn supported_mimes(mut self, mimes: &[&str]) -> Self {
        self.config.supported_mimes = mimes.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Encoders for `mime_type` fail to initialize
    pub fn broken_encoder(mut self, mime_type: &str) -> Self {
        self.config.broken_encoders.push(mime_type.to_string());
        self
    }

    pub fn build(self) -> SimulatedBackend {
        SimulatedBackend {
            state: Arc::new(SimState {
                config: self.config,
                devices: Mutex::new(self.devices),
                permission: Mutex::new(self.permission.unwrap_or(PermissionStatus::NotDetermined)),
                labels_unlocked: AtomicBool::new(false),
                video_error: Mutex::new(None),
                live_video: Mutex::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
                next_track: AtomicU64::new(1),
                applied_zoom: Mutex::new(Vec::new()),
            }),
        }
    }
}

struct SimVideoTrack {
    id: String,
    device_id: String,
    resolution: Resolution,
    frame_rate: f64,
    state: Arc<SimState>,
    live: AtomicBool,
    frames: AtomicU64,
    torch: AtomicBool,
}

impl VideoTrack for SimVideoTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> TrackSettings {
        TrackSettings {
            device_id: self.device_id.clone(),
            resolution: self.resolution,
            frame_rate: self.frame_rate,
        }
    }

    fn capabilities(&self) -> TrackCapabilities {
        TrackCapabilities {
            zoom: self.state.config.hardware_zoom,
            torch: self.state.config.torch,
        }
    }

    fn apply_zoom(&self, level: f64) -> Result<(), CameraError> {
        if !self.is_live() {
            return Err(CameraError::CaptureUnavailable("track ended".to_string()));
        }
        if self.state.config.broken_zoom {
            return Err(CameraError::Backend("zoom control rejected by the camera HAL".to_string()));
        }
        match self.state.config.hardware_zoom {
            Some(range) if range.contains(level) => {
                lock(&self.state.applied_zoom).push(level);
                Ok(())
            }
            _ => Err(CameraError::ZoomUnsupported(format!("{:.2}x outside the hardware range", level))),
        }
    }

    fn set_torch(&self, enabled: bool) -> Result<(), CameraError> {
        if !self.state.config.torch {
            return Err(CameraError::Unsupported("no torch on this camera".to_string()));
        }
        self.torch.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn grab_frame(&self) -> Result<VideoFrame, CameraError> {
        if !self.is_live() {
            return Err(CameraError::CaptureUnavailable("track ended".to_string()));
        }
        let n = self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(synthetic_video_frame(
            n,
            self.resolution.width,
            self.resolution.height,
            &self.device_id,
        ))
    }

    fn take_photo(&self) -> Result<Option<Bytes>, CameraError> {
        if !self.state.config.still_capture {
            return Ok(None);
        }
        let frame = match self.state.config.still_resolution {
            Some(still) => {
                if !self.is_live() {
                    return Err(CameraError::CaptureUnavailable("track ended".to_string()));
                }
                synthetic_video_frame(0, still.width, still.height, &self.device_id)
            }
            None => self.grab_frame()?,
        };
        imaging::encode_jpeg(&frame, 95).map(Some)
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            lock(&self.state.live_video).remove(&self.id);
            self.state.log(SimEvent::VideoStopped {
                track_id: self.id.clone(),
                device_id: self.device_id.clone(),
            });
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && self.state.is_connected(&self.device_id)
    }
}

struct SimAudioTrack {
    id: String,
    device_id: String,
    sample_rate: u32,
    channels: u16,
    state: Arc<SimState>,
    live: AtomicBool,
    blocks: AtomicU64,
}

impl AudioTrack for SimAudioTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read_samples(&self) -> Vec<f32> {
        if !self.is_live() {
            return Vec::new();
        }
        let block = self.blocks.fetch_add(1, Ordering::SeqCst);
        synthetic_audio_samples(block, SIM_AUDIO_BLOCK, self.channels, self.sample_rate)
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.state.log(SimEvent::AudioStopped {
                track_id: self.id.clone(),
                device_id: self.device_id.clone(),
            });
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Writes a readable token per pushed frame (`F<seq>:<w>x<h>;`) and audio
/// block (`A<samples>;`)
pub struct SimEncoder {
    mime_type: String,
    seq: u64,
    pending: Vec<u8>,
}

impl FragmentEncoder for SimEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn push_video(&mut self, frame: &VideoFrame) -> Result<(), CameraError> {
        if !frame.is_valid() {
            return Err(CameraError::RecordingFailed("malformed frame".to_string()));
        }
        let token = format!("F{}:{}x{};", self.seq, frame.width, frame.height);
        self.pending.extend_from_slice(token.as_bytes());
        self.seq += 1;
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> Result<(), CameraError> {
        let token = format!("A{};", samples.len());
        self.pending.extend_from_slice(token.as_bytes());
        Ok(())
    }

    fn flush(&mut self) -> Result<Bytes, CameraError> {
        Ok(Bytes::from(std::mem::take(&mut self.pending)))
    }
}

/// Frame sizes recorded in a [`SimEncoder`] stream, in order
pub fn recorded_frames(data: &[u8]) -> Vec<Resolution> {
    String::from_utf8_lossy(data)
        .split(';')
        .filter_map(|token| token.strip_prefix('F'))
        .filter_map(|token| {
            let (_, size) = token.split_once(':')?;
            let (w, h) = size.split_once('x')?;
            Some(Resolution::new(w.parse().ok()?, h.parse().ok()?))
        })
        .collect()
}

/// Number of audio blocks recorded in a [`SimEncoder`] stream
pub fn recorded_audio_blocks(data: &[u8]) -> usize {
    String::from_utf8_lossy(data)
        .split(';')
        .filter(|token| token.starts_with('A'))
        .count()
}
