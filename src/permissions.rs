//! Camera/microphone permission boundary
//!
//! The capture core never shows permission dialogs; it only inspects the
//! status reported by the backend and turns denial into a typed error.

use crate::errors::CameraError;

/// Permission status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
}

impl PermissionStatus {
    /// Whether device labels are already visible without a prompt
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    /// Fail with `PermissionDenied` for statuses that can never succeed
    pub fn ensure_not_denied(&self) -> Result<(), CameraError> {
        match self {
            PermissionStatus::Denied => Err(CameraError::PermissionDenied(
                "camera access denied by the user".to_string(),
            )),
            PermissionStatus::Restricted => Err(CameraError::PermissionDenied(
                "camera access restricted by system policy".to_string(),
            )),
            PermissionStatus::Granted | PermissionStatus::NotDetermined => Ok(()),
        }
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Detailed permission information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
    pub can_request: bool,
}

impl PermissionInfo {
    pub fn from_status(status: PermissionStatus) -> Self {
        let (message, can_request) = match status {
            PermissionStatus::Granted => ("Camera access granted", false),
            PermissionStatus::Denied => ("Camera access denied", true),
            PermissionStatus::NotDetermined => ("Camera permission not yet requested", true),
            PermissionStatus::Restricted => ("Camera access restricted by system policy", false),
        };
        Self {
            status,
            message: message.to_string(),
            can_request,
        }
    }
}

/// Check camera permission for the native desktop backend
#[cfg(feature = "native")]
pub fn check_permission_detailed() -> PermissionInfo {
    #[cfg(target_os = "windows")]
    {
        check_permission_windows()
    }

    #[cfg(target_os = "linux")]
    {
        check_permission_linux()
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "Permission is resolved by the OS when the camera is opened".to_string(),
            can_request: true,
        }
    }
}

#[cfg(all(feature = "native", target_os = "windows"))]
fn check_permission_windows() -> PermissionInfo {
    // Windows gates cameras through Privacy settings; enumeration is the proxy.
    use nokhwa::query;

    match query(nokhwa::utils::ApiBackend::Auto) {
        Ok(devices) if !devices.is_empty() => PermissionInfo {
            status: PermissionStatus::Granted,
            message: "Camera access granted via Windows Privacy settings".to_string(),
            can_request: false,
        },
        Ok(_) => PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "No cameras found - permission may not be granted".to_string(),
            can_request: true,
        },
        Err(e) => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!("Camera access denied: {}", e),
            can_request: true,
        },
    }
}

#[cfg(all(feature = "native", target_os = "linux"))]
fn check_permission_linux() -> PermissionInfo {
    use std::fs::OpenOptions;
    use std::path::Path;

    let video_devices: Vec<_> = (0..10)
        .map(|i| format!("/dev/video{}", i))
        .filter(|path| Path::new(path).exists())
        .collect();

    let Some(first_device) = video_devices.first() else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "No video devices found at /dev/video*".to_string(),
            can_request: false,
        };
    };

    match OpenOptions::new().read(true).open(first_device) {
        Ok(_) => PermissionInfo {
            status: PermissionStatus::Granted,
            message: format!("Camera access granted ({} readable)", first_device),
            can_request: false,
        },
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!(
                "Camera device {} exists but is not readable - run: sudo usermod -a -G video $USER",
                first_device
            ),
            can_request: true,
        },
        Err(e) => PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: format!("Cannot access {}: {}", first_device, e),
            can_request: true,
        },
    }
}
