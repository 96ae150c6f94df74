//! End-to-end pipeline scenarios against faked collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intervu_analysis::{degraded_result, AnalysisOrchestrator, HttpAnalysisEndpoint, OrchestratorConfig};
use intervu_capture::{
    CaptureConstraints, CaptureController, CaptureError, CaptureResult, CaptureSettings,
    MediaDevices, MediaStream, PreviewHandle,
};
use intervu_firestore::{
    AnalysisStore, FirestoreError, FirestoreResult, MemoryAnalysisStore, RecordStream,
};
use intervu_models::{
    AnalysisRecord, AnalysisResult, AnalysisSource, ErrorKind, PipelineState, RecordId, Requester,
};
use intervu_pipeline::{PipelineController, PipelineError};
use intervu_storage::{
    CredentialProvider, HttpUploadClient, HttpUploadConfig, ProgressTracker, StaticCredential,
    UploadManager,
};

const MIB: u64 = 1024 * 1024;

fn analysis(tag: &str) -> Value {
    json!({
        "overall_assessment": tag,
        "speaking_skills": {
            "clarity": "Clear and articulate",
            "pace": "A little fast in the second answer",
            "tone": "Friendly",
            "improvements": ["Pause before key points"]
        },
        "body_language": {
            "posture": "Upright",
            "eye_contact": "Mostly on camera",
            "gestures": "Natural",
            "improvements": ["Keep hands in frame"]
        },
        "confidence_and_presence": {
            "confidence_level": "Moderate",
            "presence": "Engaged",
            "improvements": ["Open with a stronger statement"]
        },
        "answer_quality": {
            "relevance": "On topic",
            "structure": "Loose",
            "depth": "Good examples",
            "improvements": ["Use the STAR structure"]
        },
        "final_action_plan": [
            "Record a second take",
            "Outline answers before speaking",
            "Practice eye contact"
        ]
    })
}

fn analysis_ok(tag: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "analysis": analysis(tag) }))
}

struct Harness {
    server: MockServer,
    pipeline: PipelineController,
    store: Arc<dyn AnalysisStore>,
}

impl Harness {
    async fn new() -> Self {
        Self::build(Some("token"), Arc::new(MemoryAnalysisStore::new())).await
    }

    async fn build(token: Option<&str>, store: Arc<dyn AnalysisStore>) -> Self {
        let server = MockServer::start().await;
        let credentials: Arc<dyn CredentialProvider> = Arc::new(match token {
            Some(t) => StaticCredential::new(t),
            None => StaticCredential::anonymous(),
        });
        let progress = ProgressTracker::new();

        let upload_client = HttpUploadClient::new(HttpUploadConfig {
            endpoint_url: format!("{}/upload", server.uri()),
            timeout: Duration::from_secs(30),
        })
        .unwrap();
        let uploads = UploadManager::new(Arc::new(upload_client), credentials.clone(), progress.clone());

        let analysis = AnalysisOrchestrator::new(
            Arc::new(HttpAnalysisEndpoint::new("primary", format!("{}/analyze/primary", server.uri())).unwrap()),
            Arc::new(HttpAnalysisEndpoint::new("fallback", format!("{}/analyze/fallback", server.uri())).unwrap()),
            credentials,
            progress,
            OrchestratorConfig {
                attempt_timeout: Duration::from_secs(30),
                degraded_fallback: true,
            },
        );

        let pipeline = PipelineController::new(
            Requester::new("student-7").with_display_name("Sam"),
            CaptureController::new(Arc::new(SilentDevices), CaptureSettings::default()),
            uploads,
            analysis,
            store.clone(),
            100 * MIB,
        )
        .with_skills(["system design"]);

        Self {
            server,
            pipeline,
            store,
        }
    }

    async fn mount_upload(&self) {
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "filePath": "interviews/student-7/take.mp4"
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    async fn requests(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    async fn history(&self) -> Vec<AnalysisRecord> {
        self.store.list("student-7").try_collect().await.unwrap()
    }
}

fn sparse_file(suffix: &str, size: u64) -> NamedTempFile {
    let file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.as_file().set_len(size).unwrap();
    file
}

// Scenario A
#[tokio::test]
async fn test_upload_then_primary_analysis_is_saved() {
    let harness = Harness::new().await;
    harness.mount_upload().await;
    Mock::given(method("POST"))
        .and(path("/analyze/primary"))
        .and(header("authorization", "Bearer token"))
        .respond_with(analysis_ok("primary"))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze/fallback"))
        .respond_with(analysis_ok("fallback"))
        .expect(0)
        .mount(&harness.server)
        .await;

    let file = sparse_file(".mp4", 50 * MIB);
    let summary = harness.pipeline.accept_file(file.path()).await.unwrap();
    assert_eq!(summary.mime_type, "video/mp4");
    assert_eq!(summary.size_bytes, 50 * MIB);

    let outcome = harness.pipeline.analyze_video().await.unwrap();
    assert_eq!(outcome.analysis.source, AnalysisSource::Primary);
    assert!(outcome.analysis.is_live());
    assert!(outcome.persistence_error.is_none());

    let record = outcome.record.unwrap();
    assert!((3..=5).contains(&record.result.final_action_plan.len()));
    assert_eq!(record.video_reference, "interviews/student-7/take.mp4");
    assert_eq!(
        harness.pipeline.state(),
        PipelineState::Saved {
            record_id: record.id.to_string()
        }
    );
    assert_eq!(*harness.pipeline.subscribe_progress().borrow(), 100);

    // The analysis call referenced the stored path instead of re-sending the bytes.
    let requests = harness.server.received_requests().await.unwrap();
    let analyze = requests
        .iter()
        .find(|r| r.url.path() == "/analyze/primary")
        .unwrap();
    let body = String::from_utf8_lossy(&analyze.body);
    assert!(body.contains("interviews/student-7/take.mp4"));
    assert!(body.contains("system design"));
    assert!(analyze.body.len() < MIB as usize);

    let history = harness.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], record);
}

// Scenario B
#[tokio::test]
async fn test_oversized_file_rejected_before_network() {
    let harness = Harness::new().await;
    let file = sparse_file(".mp4", 150 * MIB);

    let err = harness.pipeline.accept_file(file.path()).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::FileTooLarge));
    assert_eq!(
        harness.pipeline.state(),
        PipelineState::Errored {
            kind: ErrorKind::FileTooLarge
        }
    );
    assert!(matches!(
        harness.pipeline.analyze_video().await,
        Err(PipelineError::NotReady)
    ));
    assert_eq!(harness.requests().await, 0);
}

// Scenario C
#[tokio::test]
async fn test_text_file_rejected_before_network() {
    let harness = Harness::new().await;
    let file = sparse_file(".txt", 1024);

    let err = harness.pipeline.accept_file(file.path()).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidMediaType));
    assert_eq!(harness.requests().await, 0);
}

// Scenario D
#[tokio::test]
async fn test_primary_error_uses_fallback_once() {
    let harness = Harness::new().await;
    harness.mount_upload().await;
    Mock::given(method("POST"))
        .and(path("/analyze/primary"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "error": "model overloaded"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze/fallback"))
        .respond_with(analysis_ok("fallback"))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .pipeline
        .accept_bytes("take.mp4", Some("video/mp4"), Bytes::from_static(b"mp4 bytes"))
        .await
        .unwrap();
    let outcome = harness.pipeline.analyze_video().await.unwrap();

    let expected: AnalysisResult = serde_json::from_value(analysis("fallback")).unwrap();
    assert_eq!(outcome.analysis.result, expected);
    assert_eq!(outcome.analysis.source, AnalysisSource::Fallback);
    assert_eq!(outcome.analysis.failures.len(), 1);
    assert_eq!(outcome.record.unwrap().source, AnalysisSource::Fallback);
}

// Scenario E
#[tokio::test]
async fn test_both_endpoints_fail_degraded_result_is_persisted() {
    let harness = Harness::new().await;
    harness.mount_upload().await;
    Mock::given(method("POST"))
        .and(path("/analyze/primary"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze/fallback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "analysis": "Here is your feedback: {\"overall_assessment\": \"good\"}"
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .pipeline
        .accept_bytes("take.mp4", Some("video/mp4"), Bytes::from_static(b"mp4 bytes"))
        .await
        .unwrap();
    let outcome = harness.pipeline.analyze_video().await.unwrap();

    assert_eq!(outcome.analysis.result, degraded_result());
    assert_eq!(outcome.analysis.source, AnalysisSource::Degraded);
    assert!(!outcome.analysis.is_live());
    assert_eq!(outcome.analysis.failures.len(), 2);

    let record = outcome.record.unwrap();
    assert!(!record.is_live());

    let history = harness.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, AnalysisSource::Degraded);
}

#[tokio::test]
async fn test_persistence_failure_still_returns_result() {
    let harness = Harness::build(Some("token"), Arc::new(UnavailableStore)).await;
    harness.mount_upload().await;
    Mock::given(method("POST"))
        .and(path("/analyze/primary"))
        .respond_with(analysis_ok("primary"))
        .mount(&harness.server)
        .await;

    harness
        .pipeline
        .accept_bytes("take.mp4", Some("video/mp4"), Bytes::from_static(b"mp4 bytes"))
        .await
        .unwrap();
    let outcome = harness.pipeline.analyze_video().await.unwrap();

    assert!(!outcome.is_saved());
    assert!(outcome.persistence_error.is_some());
    assert_eq!(outcome.analysis.source, AnalysisSource::Primary);
    assert_eq!(
        harness.pipeline.state(),
        PipelineState::Analyzed {
            source: AnalysisSource::Primary
        }
    );
}

#[tokio::test]
async fn test_missing_credential_fails_without_request() {
    let harness = Harness::build(None, Arc::new(MemoryAnalysisStore::new())).await;

    harness
        .pipeline
        .accept_bytes("take.mp4", Some("video/mp4"), Bytes::from_static(b"mp4 bytes"))
        .await
        .unwrap();
    let err = harness.pipeline.analyze_video().await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Unauthenticated));
    assert_eq!(harness.requests().await, 0);
}

#[tokio::test]
async fn test_upload_rejection_surfaces_server_message() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(413).set_body_json(json!({
            "success": false,
            "error": "Quota exceeded for this account"
        })))
        .mount(&harness.server)
        .await;

    harness
        .pipeline
        .accept_bytes("take.mp4", Some("video/mp4"), Bytes::from_static(b"mp4 bytes"))
        .await
        .unwrap();
    let err = harness.pipeline.analyze_video().await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::UploadFailed));
    assert!(err.to_string().contains("Quota exceeded for this account"));
    assert_eq!(
        harness.pipeline.state(),
        PipelineState::Errored {
            kind: ErrorKind::UploadFailed
        }
    );
    // Upload failures are not retried through the analysis path.
    assert!(matches!(
        harness.pipeline.retry_analysis().await,
        Err(PipelineError::NothingToRetry)
    ));
}

#[tokio::test]
async fn test_upload_retried_with_same_recording_after_failure() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&harness.server)
        .await;
    harness.mount_upload().await;
    Mock::given(method("POST"))
        .and(path("/analyze/primary"))
        .respond_with(analysis_ok("primary"))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness
        .pipeline
        .accept_bytes("take.mp4", Some("video/mp4"), Bytes::from_static(b"mp4 bytes"))
        .await
        .unwrap();
    let err = harness.pipeline.analyze_video().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UploadFailed));

    let outcome = harness.pipeline.analyze_video().await.unwrap();
    assert_eq!(
        outcome.record.unwrap().video_reference,
        "interviews/student-7/take.mp4"
    );

    let requests = harness.server.received_requests().await.unwrap();
    let uploads: Vec<_> = requests.iter().filter(|r| r.url.path() == "/upload").collect();
    assert_eq!(uploads.len(), 2);
    for upload in uploads {
        assert!(String::from_utf8_lossy(&upload.body).contains("mp4 bytes"));
    }
}

#[tokio::test]
async fn test_history_is_repeatable_and_newest_first() {
    let harness = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/analyze/primary"))
        .respond_with(analysis_ok("primary"))
        .mount(&harness.server)
        .await;

    for name in ["first.webm", "second.webm"] {
        harness
            .pipeline
            .accept_bytes(name, None, Bytes::from_static(b"webm bytes"))
            .await
            .unwrap();
        harness.pipeline.analyze_direct().await.unwrap();
    }

    let first: Vec<AnalysisRecord> = harness.pipeline.history().try_collect().await.unwrap();
    let second: Vec<AnalysisRecord> = harness.pipeline.history().try_collect().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].video_reference, "inline:second.webm");
    assert_eq!(first[1].video_reference, "inline:first.webm");
}

// Scenario F
#[tokio::test(start_paused = true)]
async fn test_recording_auto_stops_at_ceiling() {
    let released = Arc::new(AtomicBool::new(false));
    let devices = Arc::new(TickingDevices {
        released: released.clone(),
    });
    let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredential::new("token"));
    let progress = ProgressTracker::new();
    let pipeline = PipelineController::new(
        Requester::new("student-7"),
        CaptureController::new(devices, CaptureSettings::default()),
        UploadManager::new(
            Arc::new(
                HttpUploadClient::new(HttpUploadConfig {
                    endpoint_url: "http://127.0.0.1:9/upload".into(),
                    timeout: Duration::from_secs(5),
                })
                .unwrap(),
            ),
            credentials.clone(),
            progress.clone(),
        ),
        AnalysisOrchestrator::new(
            Arc::new(HttpAnalysisEndpoint::new("primary", "http://127.0.0.1:9/a").unwrap()),
            Arc::new(HttpAnalysisEndpoint::new("fallback", "http://127.0.0.1:9/b").unwrap()),
            credentials,
            progress,
            OrchestratorConfig::default(),
        ),
        Arc::new(MemoryAnalysisStore::new()),
        100 * MIB,
    );

    let started = tokio::time::Instant::now();
    pipeline.start_capture().await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Capturing);

    let summary = pipeline.wait_for_auto_stop().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(130));
    assert!(summary.size_bytes > 0);
    assert_eq!(summary.mime_type, "video/webm");
    assert!(matches!(pipeline.state(), PipelineState::Ready { .. }));
    assert!(released.load(Ordering::SeqCst));
}

/// Device that is never available.
struct SilentDevices;

#[async_trait]
impl MediaDevices for SilentDevices {
    async fn open(&self, _constraints: &CaptureConstraints) -> CaptureResult<Box<dyn MediaStream>> {
        Err(CaptureError::permission_denied("no camera"))
    }
}

/// Device that emits one chunk per second until stopped.
struct TickingDevices {
    released: Arc<AtomicBool>,
}

struct TickingStream {
    stopped: bool,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl MediaDevices for TickingDevices {
    async fn open(&self, _constraints: &CaptureConstraints) -> CaptureResult<Box<dyn MediaStream>> {
        Ok(Box::new(TickingStream {
            stopped: false,
            released: self.released.clone(),
        }))
    }
}

#[async_trait]
impl MediaStream for TickingStream {
    fn preview(&self) -> PreviewHandle {
        PreviewHandle {
            stream_id: "ticking".into(),
            source: "test".into(),
        }
    }

    fn mime_type(&self) -> &str {
        "video/webm"
    }

    async fn next_chunk(&mut self) -> CaptureResult<Option<Bytes>> {
        if self.stopped {
            return Ok(None);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(Some(Bytes::from_static(b"cluster")))
    }

    async fn stop(&mut self) {
        self.stopped = true;
    }

    async fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Store whose backend is down.
struct UnavailableStore;

#[async_trait]
impl AnalysisStore for UnavailableStore {
    async fn save(
        &self,
        _owner: &Requester,
        _result: &AnalysisResult,
        _video_reference: &str,
        _source: AnalysisSource,
    ) -> FirestoreResult<AnalysisRecord> {
        Err(FirestoreError::ServerError(503, "unavailable".into()))
    }

    fn list(&self, _owner_id: &str) -> RecordStream {
        Box::pin(futures::stream::once(async {
            Err(FirestoreError::ServerError(503, "unavailable".into()))
        }))
    }

    async fn get(&self, _owner_id: &str, _id: &RecordId) -> FirestoreResult<Option<AnalysisRecord>> {
        Err(FirestoreError::ServerError(503, "unavailable".into()))
    }
}
