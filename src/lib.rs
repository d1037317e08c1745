//! CineCraft: camera device and capture-session core for a mobile camera app
//!
//! This crate manages the lifecycle of camera streams on multi-lens devices:
//! it discovers and classifies lenses, acquires streams with progressively
//! looser constraints, zooms natively, by switching lenses or with a software
//! crop, and captures photos and fragmented video recordings.
//!
//! # Features
//! - Lens classification (main, ultra-wide, telephoto) from platform labels
//! - Exclusive stream ownership with a constraint fallback ladder
//! - Native, lens-switching and software zoom with a recordable render surface
//! - Codec negotiation and timesliced fragment recording
//! - Hot-plug aware device catalog
//!
//! # Usage
//! ```rust,ignore
//! use cinecraft::{CameraService, CineCraftConfig};
//! use cinecraft::testing::SimulatedBackend;
//! use std::sync::Arc;
//!
//! let service = CameraService::with_filesystem_store(
//!     Arc::new(SimulatedBackend::phone()),
//!     CineCraftConfig::load_or_default(),
//! )?;
//! service.initialize().await?;
//! service.set_zoom(3.0).await?;
//! let photo = service.take_photo().await?;
//! ```
pub mod capture;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod imaging;
pub mod invariant_ppt;
pub mod permissions;
pub mod platform;
pub mod service;
pub mod state;
pub mod storage;
pub mod stream;
pub mod timing;
pub mod types;
pub mod zoom;

// Testing utilities - simulated backend and synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use capture::{CaptureSession, RecordingInfo, RecordingSource, RecordingStatus};
pub use catalog::DeviceCatalog;
pub use config::CineCraftConfig;
pub use errors::CameraError;
pub use platform::{DeviceEvent, DeviceMonitor, MediaBackend};
pub use service::{CameraService, SavedCapture, SwitchReport};
pub use state::{CaptureMode, SessionState, SessionStateStore, StateAction};
pub use storage::{ArtifactStore, FileSystemStore, SavedArtifact, StorageLocation};
pub use stream::{AcquireTarget, RenderTarget, StreamController, StreamSession, SwitchPolicy};
pub use types::{Artifact, ArtifactKind, AudioDevice, Device, LensRole, Resolution, VideoFrame};
pub use zoom::{ZoomMode, ZoomState, ZoomStrategy};

/// Initialize logging for the camera system
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("cinecraft=info"))
        .try_init()
        .ok();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        native_backend: cfg!(feature = "native"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Whether the nokhwa desktop backend was compiled in
    pub native_backend: bool,
}
