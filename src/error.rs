use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Check-in dispatch failed: {0}")]
    Dispatch(#[from] ResolveError),

    #[error("Frame error: {0}")]
    FrameError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Failures surfaced while acquiring or driving a camera
///
/// Every variant except [`CameraError::Unsupported`] is recoverable from the
/// caller's point of view: the user can fix the cause and start again.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera device not found")]
    DeviceNotFound,

    #[error("Camera device is busy")]
    DeviceBusy,

    #[error("Requested camera constraints cannot be satisfied")]
    Overconstrained,

    #[error("No camera API available")]
    Unsupported,

    #[error("Camera error: {0}")]
    Unknown(String),
}

impl CameraError {
    /// Map an OS-level error from the video device onto the taxonomy
    ///
    /// `EINVAL` is only meaningful while negotiating a format, so callers that
    /// are negotiating should use [`CameraError::from_negotiation`] instead.
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => CameraError::PermissionDenied,
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                CameraError::DeviceNotFound
            }
            Some(libc::EBUSY) => CameraError::DeviceBusy,
            _ => match err.kind() {
                io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
                io::ErrorKind::NotFound => CameraError::DeviceNotFound,
                _ => CameraError::Unknown(err.to_string()),
            },
        }
    }

    /// Map an error returned while applying a requested format
    pub fn from_negotiation(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EINVAL) | Some(libc::ERANGE) => CameraError::Overconstrained,
            _ => Self::from_io(err),
        }
    }

    /// Whether the caller may retry after fixing the cause
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CameraError::Unsupported)
    }

    /// Whether the error ends the current attempt and must not be retried silently
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied | CameraError::DeviceNotFound | CameraError::Unsupported
        )
    }

    /// Actionable text for the host UI
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera access was denied. Grant camera permission and try again.".to_string()
            }
            CameraError::DeviceNotFound => {
                "No camera was found. Check that the camera is connected.".to_string()
            }
            CameraError::DeviceBusy => {
                "The camera is in use by another application. Close it and retry.".to_string()
            }
            CameraError::Overconstrained => {
                "The camera does not support the requested settings. Retry.".to_string()
            }
            CameraError::Unsupported => "This device has no usable camera.".to_string(),
            CameraError::Unknown(msg) => format!("Camera error: {}. Retry.", msg),
        }
    }
}

/// Failures reported by the visit-recording collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("Customer not found: {0}")]
    NotFound(String),

    #[error("Visit rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}
