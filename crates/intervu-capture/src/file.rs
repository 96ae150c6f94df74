//! File-based intake as an alternative to live capture.
//!
//! Type and size are checked before the payload is read, so an oversized or
//! non-video file never costs more than a metadata lookup.

use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use intervu_models::{validate_media, MediaAsset, MediaError};

use crate::error::CaptureResult;

/// Accept a file from disk.
pub async fn accept_file(path: impl AsRef<Path>, max_bytes: u64) -> CaptureResult<MediaAsset> {
    let path = path.as_ref();
    let mime_type = mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string();

    let size_bytes = tokio::fs::metadata(path).await?.len();
    validate_media(&mime_type, size_bytes, max_bytes)?;

    debug!("Reading {} ({} bytes, {})", path.display(), size_bytes, mime_type);
    let bytes = tokio::fs::read(path).await?;

    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    Ok(MediaAsset::with_limit(bytes, mime_type, source_name, max_bytes)?)
}

/// Accept an in-memory selection. When no MIME type is given it is guessed
/// from the name.
pub fn accept_bytes(
    source_name: &str,
    mime_type: Option<&str>,
    bytes: impl Into<Bytes>,
    max_bytes: u64,
) -> CaptureResult<MediaAsset> {
    let mime_type = match mime_type {
        Some(m) => m.to_string(),
        None => mime_guess::from_path(source_name)
            .first_raw()
            .ok_or_else(|| MediaError::InvalidMediaType("unknown".to_string()))?
            .to_string(),
    };

    Ok(MediaAsset::with_limit(bytes, mime_type, source_name, max_bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use intervu_models::MAX_MEDIA_BYTES;
    use std::io::Write;

    #[tokio::test]
    async fn test_accept_mp4_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.mp4");
        std::fs::File::create(&path).unwrap().write_all(&[0u8; 2048]).unwrap();

        let asset = accept_file(&path, MAX_MEDIA_BYTES).await.unwrap();
        assert_eq!(asset.mime_type(), "video/mp4");
        assert_eq!(asset.size_bytes(), 2048);
        assert_eq!(asset.source_name(), "answer.mp4");
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_before_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.mp4");
        // Sparse file: the size check must not need the payload.
        std::fs::File::create(&path)
            .unwrap()
            .set_len(150 * 1024 * 1024)
            .unwrap();

        let err = accept_file(&path, MAX_MEDIA_BYTES).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Media(MediaError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_text_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not a video").unwrap();

        let err = accept_file(&path, MAX_MEDIA_BYTES).await.unwrap_err();
        assert!(matches!(err, CaptureError::Media(MediaError::InvalidMediaType(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = accept_file("/nonexistent/take.webm", MAX_MEDIA_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }

    #[test]
    fn test_accept_bytes_guesses_type() {
        let asset = accept_bytes("clip.webm", None, vec![1u8; 10], MAX_MEDIA_BYTES).unwrap();
        assert_eq!(asset.mime_type(), "video/webm");

        let err = accept_bytes("clip", None, vec![1u8; 10], MAX_MEDIA_BYTES).unwrap_err();
        assert!(matches!(err, CaptureError::Media(MediaError::InvalidMediaType(_))));
    }

    #[test]
    fn test_accept_bytes_explicit_type_wins() {
        let asset =
            accept_bytes("clip.bin", Some("video/quicktime"), vec![1u8; 10], MAX_MEDIA_BYTES).unwrap();
        assert_eq!(asset.extension(), "mov");
    }
}
