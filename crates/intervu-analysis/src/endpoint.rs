//! Analysis endpoint client.
//!
//! Primary and fallback endpoints share one contract, so both are instances of
//! [`HttpAnalysisEndpoint`] differing only in name and URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info_span, Instrument};

use intervu_models::{AnalysisRequest, AssetReference};
use intervu_storage::{progress_body, ProgressTracker};

use crate::error::{AnalysisError, AnalyzeResult};

/// One analysis service.
#[async_trait]
pub trait AnalysisEndpoint: Send + Sync {
    /// Name used in logs and failure messages.
    fn name(&self) -> &str;

    /// Submit the request and return the raw, unvalidated `analysis` value.
    async fn submit(
        &self,
        request: &AnalysisRequest,
        bearer: &str,
        progress: &ProgressTracker,
    ) -> AnalyzeResult<Value>;
}

/// Response envelope shared by both endpoints.
#[derive(Debug, Deserialize)]
struct EndpointResponse {
    #[serde(default)]
    success: bool,
    analysis: Option<Value>,
    error: Option<String>,
    message: Option<String>,
}

impl EndpointResponse {
    fn failure_message(&self) -> String {
        self.error
            .as_deref()
            .or(self.message.as_deref())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("no analysis returned")
            .to_string()
    }
}

/// Multipart HTTP analysis endpoint.
#[derive(Clone)]
pub struct HttpAnalysisEndpoint {
    name: String,
    url: String,
    http: Client,
}

impl HttpAnalysisEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> AnalyzeResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_form(&self, request: &AnalysisRequest, progress: &ProgressTracker) -> AnalyzeResult<Form> {
        let mut form = Form::new().text("prompt", request.prompt_text().to_string());

        form = match request.asset() {
            AssetReference::Stored(path) => form.text("videoUrl", path.clone()),
            AssetReference::Inline(asset) => {
                let body = progress_body(asset.bytes().clone(), progress.clone());
                let part = Part::stream_with_length(body, asset.size_bytes())
                    .file_name(asset.source_name().to_string())
                    .mime_str(asset.mime_type())
                    .map_err(|e| AnalysisError::request_failed(&self.name, e.to_string()))?;
                form.part("video", part)
            }
        };

        if let Some(hints) = request.context_hints() {
            let json = serde_json::to_string(hints)
                .map_err(|e| AnalysisError::request_failed(&self.name, e.to_string()))?;
            form = form.text("studentInfo", json);
        }

        Ok(form)
    }
}

#[async_trait]
impl AnalysisEndpoint for HttpAnalysisEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(
        &self,
        request: &AnalysisRequest,
        bearer: &str,
        progress: &ProgressTracker,
    ) -> AnalyzeResult<Value> {
        let span = info_span!("analysis_request", endpoint = %self.name);

        async {
            let form = self.build_form(request, progress)?;

            let response = self
                .http
                .post(&self.url)
                .bearer_auth(bearer)
                .multipart(form)
                .send()
                .await
                .map_err(|e| AnalysisError::request_failed(&self.name, e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| AnalysisError::request_failed(&self.name, e.to_string()))?;
            debug!(status = status.as_u16(), bytes = text.len(), "Analysis endpoint responded");

            let parsed = serde_json::from_str::<EndpointResponse>(&text);

            if !status.is_success() {
                let message = parsed
                    .map(|r| r.failure_message())
                    .unwrap_or_else(|_| text.chars().take(200).collect());
                return Err(AnalysisError::HttpStatus {
                    endpoint: self.name.clone(),
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed = parsed.map_err(|e| {
                AnalysisError::schema_violation(format!("{} returned a malformed envelope: {}", self.name, e))
            })?;

            let message = parsed.failure_message();
            match parsed.analysis {
                Some(analysis) if parsed.success => Ok(analysis),
                _ => Err(AnalysisError::Unsuccessful {
                    endpoint: self.name.clone(),
                    message,
                }),
            }
        }
        .instrument(span)
        .await
    }
}
