//! Upload error types.

use thiserror::Error;

use intervu_models::MediaError;

/// Result type for upload operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Message used when the server gives no reason for a failure.
pub const GENERIC_NETWORK_ERROR: &str = "Network error during upload. Please check your connection and try again.";

/// Errors that can occur while uploading an asset.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure upload client: {0}")]
    ConfigError(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid media: {0}")]
    Media(#[from] MediaError),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Upload rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    /// Check if the failure was raised locally, before anything was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            StorageError::Unauthenticated(_) | StorageError::Media(_) | StorageError::ConfigError(_)
        )
    }

    /// Check if retrying the same upload may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Network(_) | StorageError::UploadFailed(_) | StorageError::AwsSdk(_) => true,
            StorageError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            StorageError::Rejected { message, .. } | StorageError::UploadFailed(message) => {
                message.clone()
            }
            StorageError::Network(_) | StorageError::AwsSdk(_) => GENERIC_NETWORK_ERROR.to_string(),
            other => other.to_string(),
        }
    }
}
