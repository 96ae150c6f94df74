//! HTTP upload endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info_span, Instrument};

use intervu_models::MediaAsset;

use crate::error::{StorageError, StorageResult, GENERIC_NETWORK_ERROR};
use crate::progress::{progress_body, ProgressTracker};
use crate::uploader::AssetUploader;

/// Configuration for the upload endpoint.
#[derive(Debug, Clone)]
pub struct HttpUploadConfig {
    pub endpoint_url: String,
    pub timeout: Duration,
}

impl HttpUploadConfig {
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("INTERVU_UPLOAD_URL")
                .map_err(|_| StorageError::config_error("INTERVU_UPLOAD_URL not set"))?,
            timeout: Duration::from_secs(
                std::env::var("INTERVU_UPLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        })
    }
}

/// Response body of the upload endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    file_path: Option<String>,
    error: Option<String>,
}

/// Multipart upload to an authenticated HTTP endpoint, with byte-level progress.
#[derive(Clone)]
pub struct HttpUploadClient {
    http: Client,
    config: HttpUploadConfig,
}

impl HttpUploadClient {
    pub fn new(config: HttpUploadConfig) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::new(HttpUploadConfig::from_env()?)
    }

    fn failure_message(status: reqwest::StatusCode, body: &str) -> String {
        serde_json::from_str::<UploadResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| {
                if status.is_success() {
                    GENERIC_NETWORK_ERROR.to_string()
                } else {
                    format!("{} (HTTP {})", GENERIC_NETWORK_ERROR, status.as_u16())
                }
            })
    }
}

#[async_trait]
impl AssetUploader for HttpUploadClient {
    async fn transfer(
        &self,
        asset: &MediaAsset,
        owner_id: &str,
        bearer: &str,
        progress: &ProgressTracker,
    ) -> StorageResult<String> {
        let span = info_span!("upload_request", endpoint = %self.config.endpoint_url);

        async {
            let body = progress_body(asset.bytes().clone(), progress.clone());
            let part = Part::stream_with_length(body, asset.size_bytes())
                .file_name(asset.source_name().to_string())
                .mime_str(asset.mime_type())?;
            let form = Form::new()
                .text("userId", owner_id.to_string())
                .part("file", part);

            let response = self
                .http
                .post(&self.config.endpoint_url)
                .bearer_auth(bearer)
                .multipart(form)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Upload endpoint responded");

            if !status.is_success() {
                return Err(StorageError::Rejected {
                    status: status.as_u16(),
                    message: Self::failure_message(status, &text),
                });
            }

            let parsed: UploadResponse = serde_json::from_str(&text).map_err(|_| {
                StorageError::upload_failed(GENERIC_NETWORK_ERROR)
            })?;

            match (parsed.success, parsed.file_path) {
                (true, Some(path)) if !path.is_empty() => Ok(path),
                _ => Err(StorageError::upload_failed(Self::failure_message(status, &text))),
            }
        }
        .instrument(span)
        .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
