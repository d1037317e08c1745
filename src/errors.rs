use thiserror::Error;

/// Errors surfaced by the capture core.
///
/// Every fatal variant leaves the core idle (no stream half-open, no recorder
/// running) so the user can retry. `ZoomUnsupported` is the only non-fatal
/// variant: zoom degrades to a fallback strategy instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Device busy: {0}")]
    DeviceBusy(String),
    #[error("Camera unavailable, all constraint tiers failed: {0}")]
    AcquisitionFailed(String),
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("Recording failed: {0}")]
    RecordingFailed(String),
    #[error("No active recording")]
    NoActiveRecording,
    #[error("Zoom unsupported: {0}")]
    ZoomUnsupported(String),
    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl CameraError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => "CAMERA_PERMISSION_DENIED",
            CameraError::DeviceNotFound(_) => "CAMERA_NOT_FOUND",
            CameraError::DeviceBusy(_) => "CAMERA_IN_USE",
            CameraError::AcquisitionFailed(_) => "CAMERA_UNAVAILABLE",
            CameraError::CaptureUnavailable(_) => "CAPTURE_UNAVAILABLE",
            CameraError::RecordingFailed(_) => "RECORDING_FAILED",
            CameraError::NoActiveRecording => "NO_ACTIVE_RECORDING",
            CameraError::ZoomUnsupported(_) => "ZOOM_ERROR",
            CameraError::StorageWriteFailed(_) => "STORAGE_ERROR",
            CameraError::Unsupported(_) => "UNSUPPORTED",
            CameraError::InvalidState(_) => "INVALID_STATE",
            CameraError::ConfigError(_) => "CONFIG_ERROR",
            CameraError::Backend(_) => "UNKNOWN_ERROR",
        }
    }

    /// Whether the error interrupts the operation (as opposed to degrading it).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CameraError::ZoomUnsupported(_))
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => {
                "Camera permission denied. Enable it in the system settings."
            }
            CameraError::DeviceNotFound(_) => "No camera was detected on this device.",
            CameraError::DeviceBusy(_) => "The camera is already in use by another application.",
            CameraError::AcquisitionFailed(_) => {
                "Unable to start the camera. Check the permissions and try again."
            }
            CameraError::CaptureUnavailable(_) => "The camera is not ready.",
            CameraError::RecordingFailed(_) => "Unable to record video.",
            CameraError::NoActiveRecording => "No recording is in progress.",
            CameraError::ZoomUnsupported(_) => "Error while changing the zoom.",
            CameraError::StorageWriteFailed(_) => "Error while saving the file.",
            CameraError::Unsupported(_) => "This feature is not available on this camera.",
            CameraError::InvalidState(_)
            | CameraError::ConfigError(_)
            | CameraError::Backend(_) => "An unexpected error occurred.",
        }
    }
}

impl From<std::io::Error> for CameraError {
    fn from(e: std::io::Error) -> Self {
        CameraError::StorageWriteFailed(e.to_string())
    }
}

impl From<image::ImageError> for CameraError {
    fn from(e: image::ImageError) -> Self {
        CameraError::CaptureUnavailable(format!("image processing failed: {}", e))
    }
}
