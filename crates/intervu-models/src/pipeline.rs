//! Pipeline state machine.
//!
//! States advance one way through
//! `Idle → Capturing → Ready → Uploading → Uploaded → Analyzing → Analyzed → Saved`.
//! `Errored` is reachable from every non-terminal state and always allows a
//! return to `Idle`; recoverable analysis failures may also re-enter
//! `Analyzing` without re-uploading, and failed uploads may re-enter
//! `Uploading` with the same asset. Cancellation of an in-flight step returns
//! to `Idle`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisSource;
use crate::media::MediaSummary;

/// Failure categories surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No camera/microphone access or no device
    PermissionDenied,
    /// Device failed while recording
    CaptureFailed,
    InvalidMediaType,
    FileTooLarge,
    /// Missing or expired credential
    Unauthenticated,
    UploadFailed,
    /// Both analysis endpoints failed and no degraded result was used
    AnalysisEndpointFailed,
    SchemaViolation,
    PersistenceFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::CaptureFailed => "capture_failed",
            Self::InvalidMediaType => "invalid_media_type",
            Self::FileTooLarge => "file_too_large",
            Self::Unauthenticated => "unauthenticated",
            Self::UploadFailed => "upload_failed",
            Self::AnalysisEndpointFailed => "analysis_endpoint_failed",
            Self::SchemaViolation => "schema_violation",
            Self::PersistenceFailed => "persistence_failed",
        }
    }

    /// Failures that allow re-entering `Analyzing` with the already-uploaded asset.
    pub fn allows_reanalysis(&self) -> bool {
        matches!(self, Self::AnalysisEndpointFailed)
    }

    /// Failures that allow re-entering `Uploading` with the retained asset.
    pub fn allows_reupload(&self) -> bool {
        matches!(self, Self::UploadFailed)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current pipeline state, broadcast to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Capturing,
    Ready { asset: MediaSummary },
    Uploading,
    Uploaded { stored_path: String },
    Analyzing,
    Analyzed { source: AnalysisSource },
    Saved { record_id: String },
    Errored { kind: ErrorKind },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Ready { .. } => "ready",
            Self::Uploading => "uploading",
            Self::Uploaded { .. } => "uploaded",
            Self::Analyzing => "analyzing",
            Self::Analyzed { .. } => "analyzed",
            Self::Saved { .. } => "saved",
            Self::Errored { .. } => "errored",
        }
    }

    /// Terminal for the current attempt.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Saved { .. } => true,
            Self::Errored { kind } => !kind.allows_reanalysis() && !kind.allows_reupload(),
            _ => false,
        }
    }

    /// A new run may begin from this state.
    pub fn accepts_new_run(&self) -> bool {
        matches!(
            self,
            Self::Idle
                | Self::Ready { .. }
                | Self::Analyzed { .. }
                | Self::Saved { .. }
                | Self::Errored { .. }
        )
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (Errored { kind }, Analyzing) => kind.allows_reanalysis(),
            (Errored { kind }, Uploading) => kind.allows_reupload(),
            (Errored { .. }, Idle) => true,
            (Errored { .. }, _) => false,
            (Saved { .. }, Idle) => true,
            (Saved { .. }, _) => false,
            (_, Errored { .. }) => true,
            // Cancel, discard, or start over.
            (_, Idle) => true,
            (Idle, Capturing) | (Idle, Ready { .. }) => true,
            (Capturing, Ready { .. }) => true,
            (Ready { .. }, Uploading) | (Ready { .. }, Analyzing) => true,
            (Uploading, Uploaded { .. }) => true,
            (Uploaded { .. }, Analyzing) => true,
            (Analyzing, Analyzed { .. }) => true,
            (Analyzed { .. }, Saved { .. }) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Errored { kind } => write!(f, "errored({})", kind),
            other => write!(f, "{}", other.name()),
        }
    }
}
