//! Model validation errors.

use thiserror::Error;

/// Result type for media validation.
pub type MediaResult<T> = Result<T, MediaError>;

/// Local validation failures for a media asset.
///
/// These are raised before any network call is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("Invalid media type: {0} (expected a video/* type)")]
    InvalidMediaType(String),

    #[error("File too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },
}

impl MediaError {
    pub fn invalid_media_type(mime: impl Into<String>) -> Self {
        Self::InvalidMediaType(mime.into())
    }
}
