//! Pipeline error types.

use thiserror::Error;

use intervu_analysis::AnalysisError;
use intervu_capture::CaptureError;
use intervu_firestore::FirestoreError;
use intervu_models::{ErrorKind, MediaError};
use intervu_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Upload error: {0}")]
    Storage(#[from] StorageError),

    /// The transfer ran and failed; carries the message for the user.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] FirestoreError),

    #[error("Another run is in progress: {0}")]
    Busy(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("No recording or file is ready")]
    NotReady,

    #[error("Nothing to retry")]
    NothingToRetry,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Category shown to the user, for failures that end a run.
    ///
    /// `None` for control-flow errors (busy, cancelled, misuse) that leave the
    /// pipeline state unchanged or idle.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineError::Capture(e) => capture_kind(e),
            PipelineError::Media(e) => Some(media_kind(e)),
            PipelineError::Storage(e) => match e {
                StorageError::Unauthenticated(_) => Some(ErrorKind::Unauthenticated),
                StorageError::Media(m) => Some(media_kind(m)),
                StorageError::ConfigError(_) => None,
                _ => Some(ErrorKind::UploadFailed),
            },
            PipelineError::UploadFailed(_) => Some(ErrorKind::UploadFailed),
            PipelineError::Analysis(e) => match e {
                AnalysisError::Unauthenticated(_) => Some(ErrorKind::Unauthenticated),
                AnalysisError::SchemaViolation(_) => Some(ErrorKind::SchemaViolation),
                AnalysisError::ConfigError(_) => None,
                _ => Some(ErrorKind::AnalysisEndpointFailed),
            },
            PipelineError::Persistence(_) => Some(ErrorKind::PersistenceFailed),
            PipelineError::Busy(_)
            | PipelineError::Cancelled
            | PipelineError::NotReady
            | PipelineError::NothingToRetry
            | PipelineError::InvalidTransition { .. }
            | PipelineError::ConfigError(_) => None,
        }
    }

    /// Check if the failed analysis may be re-attempted without re-uploading.
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_some_and(|k| k.allows_reanalysis())
    }
}

fn media_kind(e: &MediaError) -> ErrorKind {
    match e {
        MediaError::InvalidMediaType(_) => ErrorKind::InvalidMediaType,
        MediaError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
    }
}

fn capture_kind(e: &CaptureError) -> Option<ErrorKind> {
    match e {
        CaptureError::PermissionDenied(_) => Some(ErrorKind::PermissionDenied),
        CaptureError::Media(m) => Some(media_kind(m)),
        CaptureError::CaptureFailed(_) | CaptureError::EmptyRecording | CaptureError::Io(_) => {
            Some(ErrorKind::CaptureFailed)
        }
        CaptureError::AlreadyCapturing | CaptureError::NotCapturing => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_failures_map_to_local_kinds() {
        let err = PipelineError::from(CaptureError::Media(MediaError::FileTooLarge {
            size_bytes: 2,
            limit_bytes: 1,
        }));
        assert_eq!(err.kind(), Some(ErrorKind::FileTooLarge));

        let err = PipelineError::from(MediaError::invalid_media_type("text/plain"));
        assert_eq!(err.kind(), Some(ErrorKind::InvalidMediaType));

        let err = PipelineError::from(StorageError::unauthenticated("expired"));
        assert_eq!(err.kind(), Some(ErrorKind::Unauthenticated));
    }

    #[test]
    fn test_only_endpoint_failures_are_recoverable() {
        let err = PipelineError::from(AnalysisError::AllEndpointsFailed {
            failures: vec!["primary down".into(), "fallback down".into()],
        });
        assert_eq!(err.kind(), Some(ErrorKind::AnalysisEndpointFailed));
        assert!(err.is_recoverable());

        assert!(!PipelineError::UploadFailed("boom".into()).is_recoverable());
        assert!(!PipelineError::from(AnalysisError::Unauthenticated("x".into())).is_recoverable());
    }

    #[test]
    fn test_control_errors_have_no_kind() {
        assert_eq!(PipelineError::busy("analyzing").kind(), None);
        assert_eq!(PipelineError::Cancelled.kind(), None);
        assert_eq!(PipelineError::from(CaptureError::AlreadyCapturing).kind(), None);
    }
}
