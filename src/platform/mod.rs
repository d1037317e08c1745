//! Platform media boundary
//!
//! The capture core talks to cameras, microphones and encoders exclusively
//! through [`MediaBackend`]. A backend plays the role a browser's media device
//! API plays on the web: it lists devices, grants tracks for constraints,
//! reports which container/codec strings it can record, and creates encoders.

pub mod device_monitor;
pub mod mjpeg;
#[cfg(feature = "native")]
pub mod native;

use crate::errors::CameraError;
use crate::permissions::PermissionStatus;
use crate::types::{FacingMode, RawDeviceInfo, Resolution, VideoFrame};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use device_monitor::{DeviceEvent, DeviceMonitor};

/// Video constraints passed to [`MediaBackend::request_video`]
///
/// All-`None` constraints are the bare `video: true` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Exact device id; the request fails rather than opening another camera
    pub device_id: Option<String>,
    pub facing_mode: Option<FacingMode>,
    pub ideal_resolution: Option<Resolution>,
    pub ideal_frame_rate: Option<f64>,
}

impl VideoConstraints {
    /// Bare request: any camera, any format
    pub fn any() -> Self {
        Self::default()
    }

    pub fn facing(mode: FacingMode) -> Self {
        Self {
            facing_mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn exact_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }

    pub fn with_ideal_resolution(mut self, resolution: Resolution) -> Self {
        self.ideal_resolution = Some(resolution);
        self
    }

    pub fn with_ideal_frame_rate(mut self, fps: f64) -> Self {
        self.ideal_frame_rate = Some(fps);
        self
    }

    pub fn is_bare(&self) -> bool {
        *self == Self::default()
    }

    /// Whether any non-mandatory preference (format or facing) is set
    pub fn has_preferences(&self) -> bool {
        self.facing_mode.is_some() || self.ideal_resolution.is_some() || self.ideal_frame_rate.is_some()
    }
}

impl fmt::Display for VideoConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bare() {
            return write!(f, "video:true");
        }
        let mut parts = Vec::new();
        if let Some(id) = &self.device_id {
            parts.push(format!("deviceId={}", id));
        }
        if let Some(mode) = self.facing_mode {
            parts.push(format!("facingMode={:?}", mode));
        }
        if let Some(res) = self.ideal_resolution {
            parts.push(format!("ideal={}", res));
        }
        if let Some(fps) = self.ideal_frame_rate {
            parts.push(format!("fps={}", fps));
        }
        write!(f, "{}", parts.join(","))
    }
}

/// Microphone constraints passed to [`MediaBackend::request_audio`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConstraints {
    pub device_id: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: false,
            sample_rate: 48_000,
            channel_count: 2,
        }
    }
}

/// Format a granted video track is actually delivering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub device_id: String,
    pub resolution: Resolution,
    pub frame_rate: f64,
}

/// Hardware zoom range reported by a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, level: f64) -> bool {
        level >= self.min && level <= self.max
    }
}

/// Optional hardware features of a track
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackCapabilities {
    pub zoom: Option<ZoomRange>,
    pub torch: bool,
}

/// A live camera track holding the hardware exclusively until stopped
pub trait VideoTrack: Send + Sync {
    fn id(&self) -> &str;
    fn settings(&self) -> TrackSettings;
    fn capabilities(&self) -> TrackCapabilities;
    /// Apply a hardware zoom level inside the reported range
    fn apply_zoom(&self, level: f64) -> Result<(), CameraError>;
    fn set_torch(&self, enabled: bool) -> Result<(), CameraError>;
    /// Latest frame as RGB8
    fn grab_frame(&self) -> Result<VideoFrame, CameraError>;
    /// High-quality still capture; `Ok(None)` when the platform has none
    fn take_photo(&self) -> Result<Option<Bytes>, CameraError>;
    /// Release the hardware. Idempotent.
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// A live microphone track
pub trait AudioTrack: Send + Sync {
    fn id(&self) -> &str;
    fn device_id(&self) -> &str;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    /// Interleaved samples captured since the previous call
    fn read_samples(&self) -> Vec<f32>;
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Parameters for [`MediaBackend::create_encoder`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderOptions {
    /// Negotiated container/codec; `None` lets the platform pick its default
    pub mime_type: Option<String>,
    pub video_bits_per_second: u32,
    pub audio_bits_per_second: u32,
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub has_audio: bool,
}

/// Incremental encoder producing container fragments
pub trait FragmentEncoder: Send {
    /// Mime type of the produced stream
    fn mime_type(&self) -> &str;
    fn push_video(&mut self, frame: &VideoFrame) -> Result<(), CameraError>;
    fn push_audio(&mut self, samples: &[f32]) -> Result<(), CameraError>;
    /// Take the bytes encoded since the previous flush (possibly empty)
    fn flush(&mut self) -> Result<Bytes, CameraError>;
}

/// Platform media API
pub trait MediaBackend: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn permission_status(&self) -> PermissionStatus;
    fn list_devices(&self) -> Result<Vec<RawDeviceInfo>, CameraError>;
    fn request_video(&self, constraints: &VideoConstraints) -> Result<Arc<dyn VideoTrack>, CameraError>;
    fn request_audio(&self, constraints: &AudioConstraints) -> Result<Arc<dyn AudioTrack>, CameraError>;
    /// Whether the platform can record the given container/codec string
    fn is_type_supported(&self, mime_type: &str) -> bool;
    fn create_encoder(&self, options: &RecorderOptions) -> Result<Box<dyn FragmentEncoder>, CameraError>;
}

/// Run a blocking backend call off the async executor
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, CameraError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CameraError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CameraError::Backend(format!("Task join error: {}", e)))?
}
