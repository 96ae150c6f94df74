//! Upload sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use intervu_models::{MediaSummary, UploadStatus};

/// One transfer of one asset. Sessions are never reused.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    pub asset: MediaSummary,
    pub status: UploadStatus,
    /// Set only when the transfer succeeded
    pub stored_path: Option<String>,
    /// Message to show when the transfer failed
    pub error: Option<String>,
    pub progress_percent: u8,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub(crate) fn begin(asset: MediaSummary) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            asset,
            status: UploadStatus::InProgress,
            stored_path: None,
            error: None,
            progress_percent: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn succeed(&mut self, stored_path: String) {
        self.status = UploadStatus::Succeeded;
        self.stored_path = Some(stored_path);
        self.progress_percent = 100;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, message: String, progress_percent: u8) {
        self.status = UploadStatus::Failed;
        self.error = Some(message);
        self.progress_percent = progress_percent;
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.status == UploadStatus::Succeeded
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
