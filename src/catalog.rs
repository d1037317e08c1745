//! Device catalog: enumeration and semantic classification of cameras and microphones
//!
//! Camera labels are only visible once the platform has granted camera access,
//! so a full [`DeviceCatalog::enumerate`] opens and immediately releases a
//! throwaway stream first. [`DeviceCatalog::refresh`] is the passive variant
//! used for hot-plug notifications.

use crate::config::AudioConfig;
use crate::errors::CameraError;
use crate::platform::{self, AudioConstraints, MediaBackend, VideoConstraints};
use crate::types::{AudioDevice, AudioKind, CapabilityHints, Device, FacingMode, LensRole, MediaKind, RawDeviceInfo};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const UNKNOWN_CAMERA_LABEL: &str = "Unknown camera";

const BACK_KEYWORDS: &[&str] = &["back", "rear", "environment"];
const FRONT_KEYWORDS: &[&str] = &["front", "selfie", "user"];
const ULTRAWIDE_KEYWORDS: &[&str] = &["ultra", "wide", "macro"];
const TELEPHOTO_KEYWORDS: &[&str] = &["tele", "zoom", "portrait"];

const DEFAULT_AUDIO_CHANNELS: u16 = 2;
const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

fn contains_any(label: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| label.contains(k))
}

/// Keep back-facing cameras
///
/// Prefers explicitly back-labelled devices, then anything not front-labelled,
/// then the unfiltered list.
pub fn filter_back_facing(devices: &[RawDeviceInfo]) -> Vec<RawDeviceInfo> {
    let lowered: Vec<String> = devices.iter().map(|d| d.label.to_lowercase()).collect();

    let back: Vec<RawDeviceInfo> = devices
        .iter()
        .zip(&lowered)
        .filter(|(_, l)| contains_any(l, BACK_KEYWORDS) && !contains_any(l, FRONT_KEYWORDS))
        .map(|(d, _)| d.clone())
        .collect();
    if !back.is_empty() {
        return back;
    }

    let not_front: Vec<RawDeviceInfo> = devices
        .iter()
        .zip(&lowered)
        .filter(|(_, l)| !contains_any(l, FRONT_KEYWORDS))
        .map(|(d, _)| d.clone())
        .collect();
    if !not_front.is_empty() {
        log::debug!("No back-labelled cameras, using {} non-front devices", not_front.len());
        return not_front;
    }

    devices.to_vec()
}

/// Role of a camera from its label, falling back to its position in the filtered list
pub fn classify_role(label: &str, index: usize) -> LensRole {
    let lower = label.to_lowercase();

    if contains_any(&lower, ULTRAWIDE_KEYWORDS) {
        return LensRole::Ultrawide;
    }
    if contains_any(&lower, TELEPHOTO_KEYWORDS) {
        return LensRole::Telephoto;
    }

    // Vendor identifiers embedded in Android camera labels
    if lower.contains("back:0") {
        return LensRole::Main;
    }
    if lower.contains("back:2") {
        return LensRole::Ultrawide;
    }
    if lower.contains("back:3") {
        return LensRole::Telephoto;
    }

    match index {
        0 => LensRole::Main,
        1 => LensRole::Ultrawide,
        _ => LensRole::Telephoto,
    }
}

/// Marketing hints shown for each lens role
pub fn hints_for(role: LensRole) -> CapabilityHints {
    let (megapixels, aperture, features): (u32, &str, &[&str]) = match role {
        LensRole::Main => (50, "f/1.8", &["OIS", "EIS"]),
        LensRole::Ultrawide => (48, "f/2.2", &["115° FOV", "Macro"]),
        LensRole::Telephoto => (32, "f/2.0", &["2x Zoom", "Portrait"]),
    };
    CapabilityHints {
        megapixels: Some(megapixels),
        aperture: Some(aperture.to_string()),
        features: features.iter().map(|f| f.to_string()).collect(),
    }
}

/// Filter and classify the video inputs of a raw platform listing
pub fn classify_devices(raw: &[RawDeviceInfo]) -> Vec<Device> {
    let video: Vec<RawDeviceInfo> = raw.iter().filter(|d| d.kind == MediaKind::VideoInput).cloned().collect();

    filter_back_facing(&video)
        .into_iter()
        .enumerate()
        .map(|(index, d)| {
            let role = classify_role(&d.label, index);
            let display_label = if d.label.trim().is_empty() {
                UNKNOWN_CAMERA_LABEL.to_string()
            } else {
                d.label.clone()
            };
            Device {
                id: d.id,
                display_label,
                role,
                hints: hints_for(role),
            }
        })
        .collect()
}

/// Transport class of a microphone from its label
pub fn classify_audio_kind(label: &str) -> AudioKind {
    let lower = label.to_lowercase();
    if contains_any(&lower, &["usb", "usb-c"]) {
        AudioKind::Usb
    } else if contains_any(&lower, &["bluetooth", "airpods", "headset"]) {
        AudioKind::Bluetooth
    } else if contains_any(&lower, &["external", "microphone"]) {
        AudioKind::External
    } else {
        AudioKind::Builtin
    }
}

/// Classify the audio inputs of a raw platform listing
pub fn classify_audio_devices(raw: &[RawDeviceInfo]) -> Vec<AudioDevice> {
    raw.iter()
        .filter(|d| d.kind == MediaKind::AudioInput)
        .map(|d| AudioDevice {
            id: d.id.clone(),
            label: d.label.clone(),
            kind: classify_audio_kind(&d.label),
            channels: d.channels.unwrap_or(DEFAULT_AUDIO_CHANNELS),
            sample_rate: d.sample_rate.unwrap_or(DEFAULT_AUDIO_SAMPLE_RATE),
        })
        .collect()
}

/// A USB microphone when present, otherwise the first one
pub fn preferred_audio_device(devices: &[AudioDevice]) -> Option<&AudioDevice> {
    devices
        .iter()
        .find(|d| d.kind == AudioKind::Usb)
        .or_else(|| devices.first())
}

/// Microphone constraints for a device
///
/// External and USB microphones do their own processing, so echo cancellation,
/// noise suppression and gain control are disabled for them.
pub fn audio_constraints_for(device: Option<&AudioDevice>, config: &AudioConfig) -> AudioConstraints {
    let mut constraints = AudioConstraints {
        device_id: device.map(|d| d.id.clone()),
        echo_cancellation: config.echo_cancellation,
        noise_suppression: config.noise_suppression,
        auto_gain_control: config.auto_gain_control,
        sample_rate: config.sample_rate,
        channel_count: config.channels,
    };
    if matches!(device.map(|d| d.kind), Some(AudioKind::Usb) | Some(AudioKind::External)) {
        constraints.echo_cancellation = false;
        constraints.noise_suppression = false;
        constraints.auto_gain_control = false;
    }
    constraints
}

/// Device lists owned by the application
pub struct DeviceCatalog {
    backend: Arc<dyn MediaBackend>,
    facing: FacingMode,
    devices: RwLock<Vec<Device>>,
    audio_devices: RwLock<Vec<AudioDevice>>,
}

impl DeviceCatalog {
    pub fn new(backend: Arc<dyn MediaBackend>, facing: FacingMode) -> Self {
        Self {
            backend,
            facing,
            devices: RwLock::new(Vec::new()),
            audio_devices: RwLock::new(Vec::new()),
        }
    }

    /// Unlock labels with a throwaway stream, then list and classify cameras
    pub async fn enumerate(&self) -> Result<Vec<Device>, CameraError> {
        let status = self.backend.permission_status();
        status.ensure_not_denied()?;

        if status.is_granted() {
            log::debug!("Camera permission already granted, skipping label unlock");
        } else {
            self.unlock_labels().await?;
        }

        self.refresh().await
    }

    async fn unlock_labels(&self) -> Result<(), CameraError> {
        let backend = self.backend.clone();
        let facing = self.facing;
        let result = platform::blocking(move || {
            match backend.request_video(&VideoConstraints::facing(facing)) {
                Ok(track) => Ok(track),
                Err(CameraError::PermissionDenied(msg)) => Err(CameraError::PermissionDenied(msg)),
                Err(e) => {
                    log::debug!("Facing-mode label unlock failed ({}), trying any camera", e);
                    backend.request_video(&VideoConstraints::any())
                }
            }
        })
        .await;

        match result {
            Ok(track) => {
                track.stop();
                log::debug!("Throwaway stream released");
                Ok(())
            }
            Err(CameraError::PermissionDenied(msg)) => {
                log::error!("Camera permission denied during enumeration: {}", msg);
                Err(CameraError::PermissionDenied(msg))
            }
            Err(e) => {
                log::warn!("Could not open a throwaway stream, labels may be empty: {}", e);
                Ok(())
            }
        }
    }

    /// List and classify cameras without opening any stream
    pub async fn refresh(&self) -> Result<Vec<Device>, CameraError> {
        let backend = self.backend.clone();
        let raw = platform::blocking(move || backend.list_devices()).await?;
        let devices = classify_devices(&raw);

        log::info!(
            "Catalog: {} camera(s) [{}]",
            devices.len(),
            devices
                .iter()
                .map(|d| format!("{}={}", d.role, d.display_label))
                .collect::<Vec<_>>()
                .join(", ")
        );

        *self.devices.write().await = devices.clone();
        Ok(devices)
    }

    /// List and classify microphones
    pub async fn enumerate_audio(&self) -> Result<Vec<AudioDevice>, CameraError> {
        let backend = self.backend.clone();
        let raw = platform::blocking(move || backend.list_devices()).await?;
        let devices = classify_audio_devices(&raw);
        log::info!("Catalog: {} microphone(s)", devices.len());
        *self.audio_devices.write().await = devices.clone();
        Ok(devices)
    }

    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.clone()
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn device(&self, id: &str) -> Option<Device> {
        self.devices.read().await.iter().find(|d| d.id == id).cloned()
    }

    /// First device classified with `role`
    pub async fn find_role(&self, role: LensRole) -> Option<Device> {
        self.devices.read().await.iter().find(|d| d.role == role).cloned()
    }

    pub async fn audio_devices(&self) -> Vec<AudioDevice> {
        self.audio_devices.read().await.clone()
    }

    pub async fn audio_device(&self, id: &str) -> Option<AudioDevice> {
        self.audio_devices.read().await.iter().find(|d| d.id == id).cloned()
    }

    pub async fn preferred_audio_device(&self) -> Option<AudioDevice> {
        preferred_audio_device(&self.audio_devices.read().await).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, label: &str) -> RawDeviceInfo {
        RawDeviceInfo::video(id, label)
    }

    #[test]
    fn test_keyword_classification() {
        assert_eq!(classify_role("Back Ultra Wide Camera", 0), LensRole::Ultrawide);
        assert_eq!(classify_role("Back Macro", 0), LensRole::Ultrawide);
        assert_eq!(classify_role("Back Telephoto Camera", 0), LensRole::Telephoto);
        assert_eq!(classify_role("Portrait lens", 0), LensRole::Telephoto);
    }

    #[test]
    fn test_vendor_identifiers() {
        assert_eq!(classify_role("camera2 0, facing back:0", 2), LensRole::Main);
        assert_eq!(classify_role("camera2 2, facing back:2", 0), LensRole::Ultrawide);
        assert_eq!(classify_role("camera2 3, facing back:3", 0), LensRole::Telephoto);
    }

    #[test]
    fn test_positional_fallback() {
        assert_eq!(classify_role("", 0), LensRole::Main);
        assert_eq!(classify_role("", 1), LensRole::Ultrawide);
        assert_eq!(classify_role("", 2), LensRole::Telephoto);
        assert_eq!(classify_role("", 7), LensRole::Telephoto);
    }

    #[test]
    fn test_front_cameras_filtered() {
        let raw = vec![
            video("f", "Front Camera"),
            video("b", "Back Camera"),
            video("s", "Selfie rear"),
        ];
        let filtered = filter_back_facing(&raw);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "b");
    }

    #[test]
    fn test_filter_falls_back_to_non_front_then_all() {
        let raw = vec![video("a", "USB Camera"), video("f", "Front Camera")];
        let filtered = filter_back_facing(&raw);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a");

        let only_front = vec![video("f", "Front Camera")];
        assert_eq!(filter_back_facing(&only_front).len(), 1);
    }

    #[test]
    fn test_unlabelled_devices_get_unknown_label() {
        let raw = vec![video("a", ""), video("b", "")];
        let devices = classify_devices(&raw);
        assert_eq!(devices[0].display_label, UNKNOWN_CAMERA_LABEL);
        assert_eq!(devices[0].role, LensRole::Main);
        assert_eq!(devices[1].role, LensRole::Ultrawide);
    }

    #[test]
    fn test_hints_follow_role() {
        let devices = classify_devices(&[video("t", "Back Telephoto")]);
        assert_eq!(devices[0].hints.megapixels, Some(32));
        assert_eq!(devices[0].hints.aperture.as_deref(), Some("f/2.0"));
    }

    #[test]
    fn test_audio_classification() {
        assert_eq!(classify_audio_kind("USB-C Audio"), AudioKind::Usb);
        assert_eq!(classify_audio_kind("AirPods Pro"), AudioKind::Bluetooth);
        assert_eq!(classify_audio_kind("External Microphone"), AudioKind::External);
        assert_eq!(classify_audio_kind("Default"), AudioKind::Builtin);
    }

    #[test]
    fn test_audio_defaults_and_preference() {
        let raw = vec![
            RawDeviceInfo::audio("m", "Built-in"),
            RawDeviceInfo::audio("u", "USB Mic").with_audio_format(1, 44_100),
            video("v", "Back Camera"),
        ];
        let devices = classify_audio_devices(&raw);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].channels, 2);
        assert_eq!(devices[0].sample_rate, 48_000);
        assert_eq!(preferred_audio_device(&devices).map(|d| d.id.as_str()), Some("u"));
    }

    #[test]
    fn test_external_mics_disable_processing() {
        let config = AudioConfig::default();
        let builtin = audio_constraints_for(None, &config);
        assert!(builtin.echo_cancellation);
        assert!(builtin.noise_suppression);
        assert!(!builtin.auto_gain_control);

        let usb = AudioDevice {
            id: "u".to_string(),
            label: "USB Mic".to_string(),
            kind: AudioKind::Usb,
            channels: 2,
            sample_rate: 48_000,
        };
        let constraints = audio_constraints_for(Some(&usb), &config);
        assert!(!constraints.echo_cancellation);
        assert!(!constraints.noise_suppression);
        assert_eq!(constraints.device_id.as_deref(), Some("u"));
        assert_eq!(constraints.sample_rate, 48_000);
    }
}
