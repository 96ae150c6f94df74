//! Primary/fallback analysis chain.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use intervu_models::{AnalysisRequest, AnalysisResult, AnalysisSource, AssetReference};
use intervu_storage::{require_bearer, CredentialProvider, ProgressTracker};

use crate::degraded::degraded_result;
use crate::endpoint::AnalysisEndpoint;
use crate::error::{AnalysisError, AnalyzeResult};
use crate::validator::validate;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on a single endpoint attempt
    pub attempt_timeout: Duration,
    /// Substitute the degraded result when both endpoints fail
    pub degraded_fallback: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(180),
            degraded_fallback: true,
        }
    }
}

/// Final, validated analysis plus where it came from.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub source: AnalysisSource,
    /// Failure messages of the attempts that did not produce the result
    pub failures: Vec<String>,
}

impl AnalysisOutcome {
    pub fn is_live(&self) -> bool {
        self.source.is_live()
    }
}

/// Tries the primary endpoint, then the fallback exactly once, then the
/// degraded result. Attempts never overlap.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    primary: Arc<dyn AnalysisEndpoint>,
    fallback: Arc<dyn AnalysisEndpoint>,
    credentials: Arc<dyn CredentialProvider>,
    progress: ProgressTracker,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        primary: Arc<dyn AnalysisEndpoint>,
        fallback: Arc<dyn AnalysisEndpoint>,
        credentials: Arc<dyn CredentialProvider>,
        progress: ProgressTracker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            credentials,
            progress,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the chain for one request.
    ///
    /// Fails without trying further endpoints when the request itself cannot
    /// be sent (`Unauthenticated`, `ConfigError`). With degraded mode disabled
    /// it also fails when both endpoints failed.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalyzeResult<AnalysisOutcome> {
        let bearer = require_bearer(self.credentials.as_ref())?;
        let inline = matches!(request.asset(), AssetReference::Inline(_));
        if inline {
            self.progress.reset();
        }

        let chain = [
            (&self.primary, AnalysisSource::Primary),
            (&self.fallback, AnalysisSource::Fallback),
        ];

        let mut failures = Vec::new();

        for (endpoint, source) in chain {
            info!(endpoint = endpoint.name(), "Requesting analysis");
            let start = Instant::now();

            match self.attempt(endpoint.as_ref(), request, &bearer).await {
                Ok(result) => {
                    if inline {
                        self.progress.complete();
                    }
                    info!(
                        endpoint = endpoint.name(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Analysis received"
                    );
                    metrics::counter!("intervu_analysis_total", "source" => source.as_str())
                        .increment(1);
                    return Ok(AnalysisOutcome {
                        result,
                        source,
                        failures,
                    });
                }
                Err(e) if !e.is_endpoint_failure() => {
                    warn!(endpoint = endpoint.name(), error = %e, "Analysis request not sendable");
                    return Err(e);
                }
                Err(e) => {
                    warn!("Failed with endpoint {}: {}", endpoint.name(), e);
                    metrics::counter!("intervu_analysis_attempt_failed_total", "endpoint" => source.as_str())
                        .increment(1);
                    failures.push(e.to_string());
                }
            }
        }

        if !self.config.degraded_fallback {
            return Err(AnalysisError::AllEndpointsFailed { failures });
        }

        warn!("All analysis endpoints failed, using degraded result");
        let degraded = serde_json::to_value(degraded_result())
            .map_err(|e| AnalysisError::schema_violation(e.to_string()))?;
        let result = validate(degraded)?;
        metrics::counter!("intervu_analysis_total", "source" => AnalysisSource::Degraded.as_str())
            .increment(1);

        Ok(AnalysisOutcome {
            result,
            source: AnalysisSource::Degraded,
            failures,
        })
    }

    async fn attempt(
        &self,
        endpoint: &dyn AnalysisEndpoint,
        request: &AnalysisRequest,
        bearer: &str,
    ) -> AnalyzeResult<AnalysisResult> {
        let raw = tokio::time::timeout(
            self.config.attempt_timeout,
            endpoint.submit(request, bearer, &self.progress),
        )
        .await
        .map_err(|_| AnalysisError::Timeout {
            endpoint: endpoint.name().to_string(),
            secs: self.config.attempt_timeout.as_secs(),
        })??;

        validate(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::HttpAnalysisEndpoint;
    use crate::prompt::INTERVIEW_ANALYSIS_PROMPT;
    use intervu_models::{ContextHints, MediaAsset, Requester};
    use intervu_storage::StaticCredential;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn analysis(tag: &str) -> Value {
        json!({
            "overall_assessment": tag,
            "speaking_skills": {
                "clarity": "Clear", "pace": "Even", "tone": "Warm",
                "improvements": ["Vary intonation"]
            },
            "body_language": {
                "posture": "Upright", "eye_contact": "Steady", "gestures": "Calm",
                "improvements": ["Relax shoulders"]
            },
            "confidence_and_presence": {
                "confidence_level": "High", "presence": "Strong",
                "improvements": ["Slow the opening"]
            },
            "answer_quality": {
                "relevance": "High", "structure": "Clear", "depth": "Good",
                "improvements": ["Add metrics"]
            },
            "final_action_plan": ["One", "Two", "Three", "Four"]
        })
    }

    fn ok_body(tag: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "success": true, "analysis": analysis(tag) }))
    }

    fn request() -> AnalysisRequest {
        let requester = Requester::new("user-1").with_display_name("Ada");
        AnalysisRequest::new(
            AssetReference::Stored("uploads/user-1/a.mp4".into()),
            INTERVIEW_ANALYSIS_PROMPT,
            "user-1",
            Some(ContextHints::for_requester(&requester).with_skills(["rust"])),
        )
    }

    fn orchestrator(server: &MockServer, config: OrchestratorConfig, token: Option<&str>) -> AnalysisOrchestrator {
        let primary = HttpAnalysisEndpoint::new("primary", format!("{}/primary", server.uri())).unwrap();
        let fallback = HttpAnalysisEndpoint::new("fallback", format!("{}/fallback", server.uri())).unwrap();
        let credentials = match token {
            Some(t) => StaticCredential::new(t),
            None => StaticCredential::anonymous(),
        };
        AnalysisOrchestrator::new(
            Arc::new(primary),
            Arc::new(fallback),
            Arc::new(credentials),
            ProgressTracker::new(),
            config,
        )
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .and(header("authorization", "Bearer t"))
            .respond_with(ok_body("primary"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fallback"))
            .respond_with(ok_body("fallback"))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = orchestrator(&server, OrchestratorConfig::default(), Some("t"))
            .analyze(&request())
            .await
            .unwrap();

        assert_eq!(outcome.source, AnalysisSource::Primary);
        assert_eq!(outcome.result.overall_assessment, "primary");
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_primary_http_error_uses_fallback_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fallback"))
            .respond_with(ok_body("fallback"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = orchestrator(&server, OrchestratorConfig::default(), Some("t"))
            .analyze(&request())
            .await
            .unwrap();

        assert_eq!(outcome.source, AnalysisSource::Fallback);
        assert_eq!(outcome.result.overall_assessment, "fallback");
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_schema_violation_treated_as_endpoint_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "analysis": format!("Sure! Here you go: {}", analysis("primary"))
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fallback"))
            .respond_with(ok_body("fallback"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = orchestrator(&server, OrchestratorConfig::default(), Some("t"))
            .analyze(&request())
            .await
            .unwrap();
        assert_eq!(outcome.source, AnalysisSource::Fallback);
    }

    #[tokio::test]
    async fn test_both_fail_yields_degraded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fallback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "quota exceeded"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = orchestrator(&server, OrchestratorConfig::default(), Some("t"))
            .analyze(&request())
            .await
            .unwrap();

        assert_eq!(outcome.source, AnalysisSource::Degraded);
        assert!(!outcome.is_live());
        assert_eq!(outcome.result, degraded_result());
        assert!(outcome.failures[1].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_degraded_disabled_reports_all_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let config = OrchestratorConfig {
            degraded_fallback: false,
            ..Default::default()
        };
        let err = orchestrator(&server, config, Some("t"))
            .analyze(&request())
            .await
            .unwrap_err();

        match err {
            AnalysisError::AllEndpointsFailed { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_slow_primary_times_out_to_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ok_body("primary").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fallback"))
            .respond_with(ok_body("fallback"))
            .expect(1)
            .mount(&server)
            .await;

        let config = OrchestratorConfig {
            attempt_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let outcome = orchestrator(&server, config, Some("t"))
            .analyze(&request())
            .await
            .unwrap();
        assert_eq!(outcome.source, AnalysisSource::Fallback);
        assert!(outcome.failures[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_credential_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok_body("primary"))
            .expect(0)
            .mount(&server)
            .await;

        let err = orchestrator(&server, OrchestratorConfig::default(), None)
            .analyze(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Unauthenticated(_)));
    }

    /// Endpoint that rejects every request before sending it.
    struct UnsendableEndpoint;

    #[async_trait::async_trait]
    impl AnalysisEndpoint for UnsendableEndpoint {
        fn name(&self) -> &str {
            "primary"
        }

        async fn submit(
            &self,
            _request: &AnalysisRequest,
            _bearer: &str,
            _progress: &ProgressTracker,
        ) -> AnalyzeResult<Value> {
            Err(AnalysisError::config_error("payload could not be encoded"))
        }
    }

    #[tokio::test]
    async fn test_config_error_stops_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok_body("fallback"))
            .expect(0)
            .mount(&server)
            .await;

        let fallback = HttpAnalysisEndpoint::new("fallback", format!("{}/fallback", server.uri())).unwrap();
        let orchestrator = AnalysisOrchestrator::new(
            Arc::new(UnsendableEndpoint),
            Arc::new(fallback),
            Arc::new(StaticCredential::new("t")),
            ProgressTracker::new(),
            OrchestratorConfig::default(),
        );

        let err = orchestrator.analyze(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_inline_payload_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ok_body("primary"))
            .expect(1)
            .mount(&server)
            .await;

        let asset = MediaAsset::new(vec![0u8; 300 * 1024], "video/webm", "take.webm").unwrap();
        let request = AnalysisRequest::new(
            AssetReference::Inline(asset),
            INTERVIEW_ANALYSIS_PROMPT,
            "user-1",
            None,
        );
        let orchestrator = orchestrator(&server, OrchestratorConfig::default(), Some("t"));
        let outcome = orchestrator.analyze(&request).await.unwrap();

        assert_eq!(outcome.source, AnalysisSource::Primary);
        assert_eq!(orchestrator.progress.current(), 100);
        let received = &server.received_requests().await.unwrap()[0];
        let body = String::from_utf8_lossy(&received.body);
        assert!(body.contains("name=\"video\""));
        assert!(!body.contains("name=\"videoUrl\""));
    }

    #[tokio::test]
    async fn test_stored_reference_sent_as_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/primary"))
            .respond_with(ok_body("primary"))
            .mount(&server)
            .await;

        orchestrator(&server, OrchestratorConfig::default(), Some("t"))
            .analyze(&request())
            .await
            .unwrap();

        let received = &server.received_requests().await.unwrap()[0];
        let body = String::from_utf8_lossy(&received.body);
        assert!(body.contains("name=\"videoUrl\""));
        assert!(body.contains("uploads/user-1/a.mp4"));
        assert!(body.contains("\"studentName\":\"Ada\""));
    }
}
