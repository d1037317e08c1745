//! Configuration management for CineCraft
//!
//! Provides configuration loading and validation for stream acquisition, zoom,
//! recording, audio, storage and interface timing.

use crate::types::{FacingMode, Resolution};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::CameraError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CineCraftConfig {
    pub camera: CameraConfig,
    pub zoom: ZoomConfig,
    pub recording: RecordingConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub interface: InterfaceConfig,
}

/// Stream acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Ideal capture resolution [width, height] for the first constraint tier
    pub ideal_resolution: [u32; 2],
    /// Ideal frames per second for the first constraint tier
    pub frame_rate: u32,
    /// Facing mode requested when no device is specified
    pub facing: FacingMode,
    /// Snapshot size used when the track reports no resolution
    pub fallback_photo_resolution: [u32; 2],
    /// Device hot-plug polling interval in milliseconds
    pub device_poll_interval_ms: u64,
}

/// Zoom strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    /// Highest zoom level accepted; requests are clamped to [1, max_level]
    pub max_level: f64,
    /// Switch lenses instead of cropping when a better lens exists
    pub auto_lens_switch: bool,
    /// Requested levels below this select the ultrawide lens
    pub ultrawide_below: f64,
    /// Requested levels above this select the telephoto lens
    pub telephoto_above: f64,
    /// Size of the software zoom render surface [width, height]
    pub surface_resolution: [u32; 2],
}

/// Video recording configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Codec probed before the static fallback list
    pub preferred_codec: Option<String>,
    /// Target video bitrate in bits per second
    pub video_bits_per_second: u32,
    /// Target audio bitrate in bits per second
    pub audio_bits_per_second: u32,
    /// Interval between emitted fragments in milliseconds
    pub timeslice_ms: u64,
}

/// Microphone processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Record audio alongside video
    pub enabled: bool,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Storage and file management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory under which storage locations are created
    pub output_directory: String,
    /// Location id selected at startup (downloads, dcim, custom)
    pub default_location: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

/// Interface timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Toggles of the controls panel closer than this are ignored
    pub controls_debounce_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            ideal_resolution: [1920, 1080],
            frame_rate: 30,
            facing: FacingMode::Environment,
            fallback_photo_resolution: [1920, 1080],
            device_poll_interval_ms: 2000,
        }
    }
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            max_level: 10.0,
            auto_lens_switch: true,
            ultrawide_below: 0.8,
            telephoto_above: 2.5,
            surface_resolution: [1280, 720],
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            preferred_codec: Some("video/mp4;codecs=h264".to_string()),
            video_bits_per_second: 20_000_000,
            audio_bits_per_second: 320_000,
            timeslice_ms: 100,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: false,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_directory: "./captures".to_string(),
            default_location: "dcim".to_string(),
            jpeg_quality: 92,
        }
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            controls_debounce_ms: 300,
        }
    }
}

impl CameraConfig {
    pub fn ideal_resolution(&self) -> Resolution {
        Resolution::from(self.ideal_resolution)
    }

    pub fn fallback_photo_resolution(&self) -> Resolution {
        Resolution::from(self.fallback_photo_resolution)
    }
}

impl ZoomConfig {
    pub fn surface_resolution(&self) -> Resolution {
        Resolution::from(self.surface_resolution)
    }
}

impl CineCraftConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: CineCraftConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(CameraError::ConfigError)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("cinecraft.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.camera.ideal_resolution[0] == 0 || self.camera.ideal_resolution[1] == 0 {
            return Err("Invalid ideal resolution".to_string());
        }
        if self.camera.frame_rate == 0 || self.camera.frame_rate > 240 {
            return Err("Invalid frame rate (must be 1-240)".to_string());
        }
        if self.camera.fallback_photo_resolution[0] == 0
            || self.camera.fallback_photo_resolution[1] == 0
        {
            return Err("Invalid fallback photo resolution".to_string());
        }

        if !self.zoom.max_level.is_finite() || self.zoom.max_level < 1.0 {
            return Err("Max zoom level must be at least 1.0".to_string());
        }
        if self.zoom.ultrawide_below >= self.zoom.telephoto_above {
            return Err("Ultrawide threshold must be below the telephoto threshold".to_string());
        }
        if self.zoom.surface_resolution[0] == 0 || self.zoom.surface_resolution[1] == 0 {
            return Err("Invalid software zoom surface resolution".to_string());
        }

        if self.recording.timeslice_ms == 0 || self.recording.timeslice_ms > 1000 {
            return Err("Recording timeslice must be between 1 and 1000 ms".to_string());
        }
        if self.recording.video_bits_per_second == 0 {
            return Err("Video bitrate must be positive".to_string());
        }

        if self.audio.channels == 0 || self.audio.channels > 8 {
            return Err("Audio channels must be between 1 and 8".to_string());
        }

        if self.storage.jpeg_quality == 0 || self.storage.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CineCraftConfig::default();
        assert_eq!(config.camera.ideal_resolution, [1920, 1080]);
        assert_eq!(config.camera.frame_rate, 30);
        assert_eq!(config.zoom.max_level, 10.0);
        assert_eq!(config.interface.controls_debounce_ms, 300);
        assert_eq!(config.recording.timeslice_ms, 100);
    }

    #[test]
    fn test_config_validation() {
        let config = CineCraftConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_config = config.clone();
        bad_config.camera.ideal_resolution = [0, 0];
        assert!(bad_config.validate().is_err());

        let mut bad_zoom = CineCraftConfig::default();
        bad_zoom.zoom.max_level = 0.5;
        assert!(bad_zoom.validate().is_err());

        let mut bad_thresholds = CineCraftConfig::default();
        bad_thresholds.zoom.ultrawide_below = 3.0;
        assert!(bad_thresholds.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CineCraftConfig = toml::from_str(
            r#"
            [zoom]
            max_level = 5.0
            auto_lens_switch = false
            "#,
        )
        .unwrap();

        assert_eq!(config.zoom.max_level, 5.0);
        assert!(!config.zoom.auto_lens_switch);
        assert_eq!(config.zoom.telephoto_above, 2.5);
        assert_eq!(config.camera.frame_rate, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir();
        let config_path = dir.join("test_cinecraft_config.toml");
        let _ = fs::remove_file(&config_path);

        fs::write(&config_path, "[storage]\njpeg_quality = 80\n").unwrap();
        let loaded = CineCraftConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.storage.jpeg_quality, 80);
        assert_eq!(loaded.storage.default_location, "dcim");

        let _ = fs::remove_file(&config_path);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = std::env::temp_dir();
        let config_path = dir.join("test_cinecraft_invalid.toml");
        fs::write(&config_path, "[storage]\njpeg_quality = 0\n").unwrap();

        let result = CineCraftConfig::load_from_file(&config_path);
        assert!(matches!(result, Err(CameraError::ConfigError(_))));

        let _ = fs::remove_file(&config_path);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = CineCraftConfig::load_from_file("nonexistent_cinecraft.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().camera.frame_rate, 30);
    }
}
