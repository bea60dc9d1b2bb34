use crate::camera::{CameraError, UnsupportedCause};

/// Errors surfaced to whoever drives a scan session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    DeviceNotFound,
    #[error("camera requires a secure context")]
    InsecureContext,
    #[error("camera not supported")]
    Unsupported,
    /// One decode cycle failed; scanning continues.
    #[error("decode failed: {0}")]
    Transient(String),
    /// The session cannot continue and has moved to `Failed`.
    #[error("scan failed: {0}")]
    Fatal(String),
}

impl ScanError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScanError::Transient(_))
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            ScanError::PermissionDenied => CameraError::PermissionDenied.remediation(),
            ScanError::DeviceNotFound => CameraError::DeviceNotFound.remediation(),
            ScanError::InsecureContext => {
                CameraError::NotSupported(UnsupportedCause::InsecureContext).remediation()
            }
            ScanError::Unsupported => {
                CameraError::NotSupported(UnsupportedCause::MissingApi).remediation()
            }
            ScanError::Transient(_) => "Hold the code steady in front of the camera.",
            ScanError::Fatal(_) => CameraError::Unknown(String::new()).remediation(),
        }
    }
}

impl From<CameraError> for ScanError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::PermissionDenied => ScanError::PermissionDenied,
            CameraError::DeviceNotFound => ScanError::DeviceNotFound,
            CameraError::NotSupported(UnsupportedCause::InsecureContext) => {
                ScanError::InsecureContext
            }
            CameraError::NotSupported(UnsupportedCause::MissingApi) => ScanError::Unsupported,
            CameraError::Unknown(reason) => ScanError::Fatal(reason),
        }
    }
}
