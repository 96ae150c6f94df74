//! Shared data models for the interview feedback pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media assets and their local validation
//! - Analysis requests, results and persisted records
//! - Upload status
//! - The pipeline state machine

pub mod analysis;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod record;
pub mod request;
pub mod upload;

// Re-export common types
pub use analysis::{
    AnalysisResult, AnalysisSource, AnswerQuality, BodyLanguage, ConfidenceAndPresence,
    SpeakingSkills,
};
pub use error::{MediaError, MediaResult};
pub use media::{validate_media, MediaAsset, MediaSummary, MAX_MEDIA_BYTES, VIDEO_MIME_PREFIX};
pub use pipeline::{ErrorKind, PipelineState};
pub use record::{AnalysisRecord, RecordId};
pub use request::{AnalysisRequest, AssetReference, ContextHints, Requester};
pub use upload::UploadStatus;
