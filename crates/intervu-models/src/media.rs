//! Media asset model.
//!
//! A `MediaAsset` is the recorded or selected video before upload. The payload
//! is held in a `Bytes` buffer so handing it to a transport does not copy it.

use std::fmt;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Maximum accepted asset size (100 MiB).
pub const MAX_MEDIA_BYTES: u64 = 100 * 1024 * 1024;

/// MIME prefix every accepted asset must carry.
pub const VIDEO_MIME_PREFIX: &str = "video/";

/// Validate MIME type and size against a ceiling.
///
/// The type check runs first so a 150 MB text file reports the type problem.
pub fn validate_media(mime_type: &str, size_bytes: u64, limit_bytes: u64) -> MediaResult<()> {
    let essence = mime_type.trim().to_ascii_lowercase();
    if !essence.starts_with(VIDEO_MIME_PREFIX) || essence.len() == VIDEO_MIME_PREFIX.len() {
        return Err(MediaError::invalid_media_type(mime_type));
    }
    if size_bytes > limit_bytes {
        return Err(MediaError::FileTooLarge {
            size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// A finished video asset held in memory.
#[derive(Clone)]
pub struct MediaAsset {
    bytes: Bytes,
    mime_type: String,
    size_bytes: u64,
    source_name: String,
}

impl MediaAsset {
    /// Create an asset, validating against the default ceiling.
    pub fn new(
        bytes: impl Into<Bytes>,
        mime_type: impl Into<String>,
        source_name: impl Into<String>,
    ) -> MediaResult<Self> {
        Self::with_limit(bytes, mime_type, source_name, MAX_MEDIA_BYTES)
    }

    /// Create an asset, validating against a custom ceiling.
    pub fn with_limit(
        bytes: impl Into<Bytes>,
        mime_type: impl Into<String>,
        source_name: impl Into<String>,
        limit_bytes: u64,
    ) -> MediaResult<Self> {
        let bytes = bytes.into();
        let mime_type = mime_type.into();
        let size_bytes = bytes.len() as u64;
        validate_media(&mime_type, size_bytes, limit_bytes)?;

        Ok(Self {
            bytes,
            mime_type,
            size_bytes,
            source_name: source_name.into(),
        })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consume the asset, handing the payload to the caller.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// File extension matching the MIME subtype, used when naming stored objects.
    pub fn extension(&self) -> &'static str {
        let essence = self.mime_type.split(';').next().unwrap_or_default().trim();
        match essence {
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            "video/x-matroska" => "mkv",
            "video/x-msvideo" => "avi",
            "video/ogg" => "ogv",
            _ => "bin",
        }
    }

    /// Lightweight description without the payload.
    pub fn summary(&self) -> MediaSummary {
        MediaSummary {
            source_name: self.source_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

impl fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaAsset")
            .field("source_name", &self.source_name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// Payload-free description of an asset, safe to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MediaSummary {
    pub source_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}
