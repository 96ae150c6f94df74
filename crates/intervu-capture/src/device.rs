//! Capture device abstraction.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::error::CaptureResult;

/// What to capture.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub video: bool,
    pub audio: bool,
    /// Container the stream is encoded in
    pub mime_type: String,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            mime_type: "video/webm".to_string(),
        }
    }
}

/// Reference to the live preview of an open stream.
///
/// Rendering is up to the host; this only identifies what to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewHandle {
    pub stream_id: String,
    /// Backend-specific description of the source, e.g. `v4l2:/dev/video0`
    pub source: String,
}

/// Grants access to capture devices.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request camera/microphone access and start streaming.
    ///
    /// Fails with `PermissionDenied` when access is refused or no device exists.
    async fn open(&self, constraints: &CaptureConstraints) -> CaptureResult<Box<dyn MediaStream>>;
}

/// An open, recording device stream.
#[async_trait]
pub trait MediaStream: Send {
    fn preview(&self) -> PreviewHandle;

    fn mime_type(&self) -> &str;

    /// Next encoded chunk, or `None` once the stream has ended.
    async fn next_chunk(&mut self) -> CaptureResult<Option<Bytes>>;

    /// Ask the device to finish; remaining chunks are still delivered by
    /// `next_chunk` until it returns `None`.
    async fn stop(&mut self);

    /// Release every device handle. Must be safe to call more than once.
    async fn release(&mut self);
}
