//! Core data types shared across the capture layer

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic role of a back-facing lens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensRole {
    Main,
    Ultrawide,
    Telephoto,
}

impl LensRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LensRole::Main => "main",
            LensRole::Ultrawide => "ultrawide",
            LensRole::Telephoto => "telephoto",
        }
    }

    /// Zoom factor the lens natively represents relative to the main lens
    pub fn nominal_zoom(&self) -> f64 {
        match self {
            LensRole::Ultrawide => 0.5,
            LensRole::Main => 1.0,
            LensRole::Telephoto => 2.0,
        }
    }
}

impl fmt::Display for LensRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marketing-level hints about a lens, shown next to the lens picker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityHints {
    pub megapixels: Option<u32>,
    pub aperture: Option<String>,
    pub features: Vec<String>,
}

/// A classified camera device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Platform identifier, stable for the session lifetime
    pub id: String,
    pub display_label: String,
    pub role: LensRole,
    pub hints: CapabilityHints,
}

/// Transport class of a microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioKind {
    Builtin,
    Usb,
    Bluetooth,
    External,
}

impl AudioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioKind::Builtin => "builtin",
            AudioKind::Usb => "usb",
            AudioKind::Bluetooth => "bluetooth",
            AudioKind::External => "external",
        }
    }
}

/// A classified audio input device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub label: String,
    pub kind: AudioKind,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Kind of device reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Unclassified device entry as listed by the platform.
///
/// Labels are empty until camera permission has been granted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: MediaKind,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
}

impl RawDeviceInfo {
    pub fn video(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: MediaKind::VideoInput,
            channels: None,
            sample_rate: None,
        }
    }

    pub fn audio(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: MediaKind::AudioInput,
            channels: None,
            sample_rate: None,
        }
    }

    pub fn with_audio_format(mut self, channels: u16, sample_rate: u32) -> Self {
        self.channels = Some(channels);
        self.sample_rate = Some(sample_rate);
        self
    }
}

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl From<[u32; 2]> for Resolution {
    fn from(value: [u32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded RGB8 video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Tightly packed RGB8 pixels, `width * height * 3` bytes
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp in seconds
    pub pts: f64,
    pub device_id: String,
}

impl VideoFrame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32, device_id: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            pts: 0.0,
            device_id: device_id.into(),
        }
    }

    pub fn with_pts(mut self, pts: f64) -> Self {
        self.pts = pts;
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Whether the buffer length matches the declared dimensions
    pub fn is_valid(&self) -> bool {
        !self.resolution().is_empty()
            && self.data.len() as u64 == self.resolution().pixels() * 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Photo,
    Video,
}

/// Finished binary output of a capture operation
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub mime_type: String,
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, mime_type: impl Into<String>, data: Bytes, resolution: Resolution) -> Self {
        Self {
            kind,
            mime_type: mime_type.into(),
            data,
            width: resolution.width,
            height: resolution.height,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension matching the mime type
    pub fn extension(&self) -> &'static str {
        crate::capture::codec::extension_for(&self.mime_type)
    }
}
