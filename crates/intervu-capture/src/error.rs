//! Error types for capture operations.

use thiserror::Error;

use intervu_models::MediaError;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors that can occur while capturing or accepting media.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No access to the camera/microphone, or no device at all
    #[error("Camera/microphone unavailable: {0}")]
    PermissionDenied(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("A capture session is already running")]
    AlreadyCapturing,

    #[error("No capture session is running")]
    NotCapturing,

    #[error("Recording produced no data")]
    EmptyRecording,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn capture_failed(msg: impl Into<String>) -> Self {
        Self::CaptureFailed(msg.into())
    }
}
