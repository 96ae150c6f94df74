//! Upload manager.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use intervu_models::MediaAsset;

use crate::credentials::{require_bearer, CredentialProvider};
use crate::error::StorageResult;
use crate::progress::ProgressTracker;
use crate::session::UploadSession;

/// Transport that moves an asset to durable storage.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Transfer the asset and return the stored path.
    ///
    /// Implementations report progress through `progress` but must never call
    /// [`ProgressTracker::complete`]; the manager does that once the stored
    /// path is confirmed.
    async fn transfer(
        &self,
        asset: &MediaAsset,
        owner_id: &str,
        bearer: &str,
        progress: &ProgressTracker,
    ) -> StorageResult<String>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Runs upload sessions against one transport.
#[derive(Clone)]
pub struct UploadManager {
    uploader: Arc<dyn AssetUploader>,
    credentials: Arc<dyn CredentialProvider>,
    progress: ProgressTracker,
}

impl UploadManager {
    pub fn new(
        uploader: Arc<dyn AssetUploader>,
        credentials: Arc<dyn CredentialProvider>,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            uploader,
            credentials,
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    /// Upload an asset.
    ///
    /// Returns `Err` only for failures caught before anything is sent. Transfer
    /// failures produce a session with `status=Failed` and a message for the user.
    /// The caller keeps the asset so a failed transfer can be retried.
    pub async fn upload(&self, asset: &MediaAsset, owner_id: &str) -> StorageResult<UploadSession> {
        let bearer = require_bearer(self.credentials.as_ref())?;

        self.progress.reset();
        let mut session = UploadSession::begin(asset.summary());

        info!(
            session_id = %session.id,
            backend = self.uploader.name(),
            size_bytes = asset.size_bytes(),
            mime_type = asset.mime_type(),
            "Starting upload"
        );
        metrics::counter!("intervu_upload_started_total", "backend" => self.uploader.name())
            .increment(1);

        match self
            .uploader
            .transfer(asset, owner_id, &bearer, &self.progress)
            .await
        {
            Ok(stored_path) => {
                self.progress.complete();
                session.succeed(stored_path);
                info!(
                    session_id = %session.id,
                    stored_path = session.stored_path.as_deref().unwrap_or_default(),
                    duration_ms = session.duration_ms().unwrap_or_default(),
                    "Upload completed"
                );
                metrics::counter!("intervu_upload_succeeded_total").increment(1);
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Upload failed");
                session.fail(e.user_message(), self.progress.current());
                metrics::counter!("intervu_upload_failed_total").increment(1);
            }
        }

        Ok(session)
    }
}
