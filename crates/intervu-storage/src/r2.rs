//! Cloudflare R2 upload backend.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};
use uuid::Uuid;

use intervu_models::MediaAsset;

use crate::error::{StorageError, StorageResult};
use crate::progress::{ProgressTracker, SimulatedRamp};
use crate::uploader::AssetUploader;

/// Interval between simulated progress steps.
const RAMP_TICK: Duration = Duration::from_millis(250);

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Object key for an uploaded recording.
pub fn recording_key(owner_id: &str, extension: &str) -> String {
    format!("interviews/{}/{}.{}", owner_id, Uuid::new_v4(), extension)
}

/// Uploads recordings straight to an R2 bucket.
///
/// `put_object` exposes no byte progress, so progress is a simulated ramp that
/// stops short of completion until R2 acknowledges the object.
#[derive(Clone)]
pub struct R2Uploader {
    client: Client,
    bucket: String,
}

impl R2Uploader {
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }
}

#[async_trait]
impl AssetUploader for R2Uploader {
    async fn transfer(
        &self,
        asset: &MediaAsset,
        owner_id: &str,
        _bearer: &str,
        progress: &ProgressTracker,
    ) -> StorageResult<String> {
        let key = recording_key(owner_id, asset.extension());
        debug!("Uploading {} bytes to {}", asset.size_bytes(), key);

        let _ramp = SimulatedRamp::start(progress.clone(), RAMP_TICK);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(asset.bytes().clone()))
            .content_type(asset.mime_type())
            .metadata("owner-id", owner_id)
            .metadata("source-name", asset.source_name())
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(e.to_string()))?;

        info!("Uploaded {} to {}", asset.source_name(), key);
        Ok(key)
    }

    fn name(&self) -> &'static str {
        "r2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_key_layout() {
        let key = recording_key("user-1", "webm");
        assert!(key.starts_with("interviews/user-1/"));
        assert!(key.ends_with(".webm"));
        assert_ne!(key, recording_key("user-1", "webm"));
    }

    #[test]
    #[serial_test::serial]
    fn test_config_requires_endpoint() {
        std::env::remove_var("R2_ENDPOINT_URL");
        let err = R2Config::from_env().unwrap_err();
        assert!(err.to_string().contains("R2_ENDPOINT_URL"));
    }
}
