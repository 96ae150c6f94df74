//! Upload manager for interview recordings.
//!
//! This crate provides:
//! - Credential checks before any request is sent
//! - Monotonic upload progress (byte-level where the transport allows it)
//! - Multipart upload to an authenticated HTTP endpoint
//! - Direct upload to Cloudflare R2

pub mod client;
pub mod credentials;
pub mod error;
pub mod progress;
pub mod r2;
pub mod session;
pub mod uploader;

pub use client::{HttpUploadClient, HttpUploadConfig};
pub use credentials::{require_bearer, CredentialProvider, StaticCredential};
pub use error::{StorageError, StorageResult, GENERIC_NETWORK_ERROR};
pub use progress::{progress_body, ProgressTracker, SimulatedRamp, PRE_CONFIRM_CAP};
pub use r2::{R2Config, R2Uploader};
pub use session::UploadSession;
pub use uploader::{AssetUploader, UploadManager};
