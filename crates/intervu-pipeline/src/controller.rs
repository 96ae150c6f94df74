//! Pipeline controller.
//!
//! Sequences capture, upload, analysis and persistence for one user and
//! exposes the current [`PipelineState`] and upload progress to the host.
//! At most one network run (upload or analysis) is in flight at a time;
//! a second call while one runs fails with [`PipelineError::Busy`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn, Instrument};

use intervu_analysis::{
    AnalysisOrchestrator, AnalysisOutcome, HttpAnalysisEndpoint, INTERVIEW_ANALYSIS_PROMPT,
};
use intervu_capture::{
    accept_bytes, accept_file, CaptureController, CaptureReport, FfmpegDeviceConfig,
    FfmpegDevices, PreviewHandle,
};
use intervu_firestore::{
    AnalysisStore, FirestoreAnalysisStore, FirestoreClient, MemoryAnalysisStore, RecordStream,
};
use intervu_models::{
    AnalysisRecord, AnalysisRequest, AssetReference, ContextHints, MediaAsset, MediaSummary,
    PipelineState, Requester,
};
use intervu_storage::{
    AssetUploader, CredentialProvider, HttpUploadClient, ProgressTracker, R2Uploader,
    StaticCredential, UploadManager, GENERIC_NETWORK_ERROR,
};

use crate::config::{PipelineConfig, StoreBackend, UploadBackend};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::PipelineLogger;

/// Everything a finished analysis run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Always present, even when saving failed
    pub analysis: AnalysisOutcome,
    pub record: Option<AnalysisRecord>,
    /// Set when the result could not be persisted
    pub persistence_error: Option<String>,
}

impl PipelineOutcome {
    pub fn is_saved(&self) -> bool {
        self.record.is_some()
    }
}

/// Cancellation handshake for the run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunSignal {
    /// No run, or the run is saving its result and can no longer be cancelled
    Closed,
    Open,
    Requested,
}

/// Per-run data carried between operations.
#[derive(Default)]
struct RunSession {
    /// Asset awaiting upload, kept after a failed transfer
    asset: Option<MediaAsset>,
    /// Request of a recoverable failed analysis
    retry: Option<AnalysisRequest>,
}

/// Held for the duration of one network run.
struct RunGuard {
    _permit: OwnedSemaphorePermit,
    signal: Arc<watch::Sender<RunSignal>>,
    cancel_rx: watch::Receiver<RunSignal>,
    logger: PipelineLogger,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.signal.send_replace(RunSignal::Closed);
    }
}

/// State machine driving one user's interview recordings.
pub struct PipelineController {
    requester: Requester,
    skills: Vec<String>,
    capture: CaptureController,
    uploads: UploadManager,
    analysis: AnalysisOrchestrator,
    store: Arc<dyn AnalysisStore>,
    max_upload_bytes: u64,
    state_tx: watch::Sender<PipelineState>,
    cancel_tx: Arc<watch::Sender<RunSignal>>,
    in_flight: Arc<Semaphore>,
    session: Mutex<RunSession>,
}

impl PipelineController {
    /// Assemble a controller from its parts.
    ///
    /// `uploads` and `analysis` should share one [`ProgressTracker`] so the
    /// host sees a single progress channel.
    pub fn new(
        requester: Requester,
        capture: CaptureController,
        uploads: UploadManager,
        analysis: AnalysisOrchestrator,
        store: Arc<dyn AnalysisStore>,
        max_upload_bytes: u64,
    ) -> Self {
        let (state_tx, _) = watch::channel(PipelineState::Idle);
        let (cancel_tx, _) = watch::channel(RunSignal::Closed);

        Self {
            requester,
            skills: Vec::new(),
            capture,
            uploads,
            analysis,
            store,
            max_upload_bytes,
            state_tx,
            cancel_tx: Arc::new(cancel_tx),
            in_flight: Arc::new(Semaphore::new(1)),
            session: Mutex::new(RunSession::default()),
        }
    }

    /// Build every collaborator from configuration.
    pub async fn from_config(config: &PipelineConfig, requester: Requester) -> PipelineResult<Self> {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticCredential::from_env());
        let progress = ProgressTracker::new();

        let uploader: Arc<dyn AssetUploader> = match config.upload_backend {
            UploadBackend::Http => Arc::new(HttpUploadClient::from_env()?),
            UploadBackend::R2 => Arc::new(R2Uploader::from_env()?),
        };

        let primary_url = config
            .primary_url
            .clone()
            .ok_or_else(|| PipelineError::config_error("INTERVU_ANALYSIS_PRIMARY_URL not set"))?;
        let fallback_url = config
            .fallback_url
            .clone()
            .ok_or_else(|| PipelineError::config_error("INTERVU_ANALYSIS_FALLBACK_URL not set"))?;

        let analysis = AnalysisOrchestrator::new(
            Arc::new(HttpAnalysisEndpoint::new("primary", primary_url)?),
            Arc::new(HttpAnalysisEndpoint::new("fallback", fallback_url)?),
            credentials.clone(),
            progress.clone(),
            config.orchestrator_config(),
        );

        let store: Arc<dyn AnalysisStore> = match config.store_backend {
            StoreBackend::Firestore => {
                Arc::new(FirestoreAnalysisStore::new(FirestoreClient::from_env().await?))
            }
            StoreBackend::Memory => Arc::new(MemoryAnalysisStore::new()),
        };

        let capture = CaptureController::new(
            Arc::new(FfmpegDevices::new(FfmpegDeviceConfig::from_env())),
            config.capture_settings(),
        );

        Ok(Self::new(
            requester,
            capture,
            UploadManager::new(uploader, credentials, progress),
            analysis,
            store,
            config.max_upload_bytes,
        ))
    }

    /// Skills forwarded to the analysis endpoint as context.
    pub fn with_skills(mut self, skills: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn state(&self) -> PipelineState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state_tx.subscribe()
    }

    /// Upload progress, 0..=100. Shared by the upload and inline analysis steps.
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.uploads.progress().subscribe()
    }

    // ------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------

    /// Open the camera and microphone and start recording.
    ///
    /// Recording stops by itself at the configured ceiling.
    pub async fn start_capture(&self) -> PipelineResult<PreviewHandle> {
        self.begin_intake().await?;
        self.transition(PipelineState::Capturing)?;

        match self.capture.start_capture().await {
            Ok(preview) => {
                info!(owner_id = %self.requester.id, stream_id = %preview.stream_id, "Capture started");
                Ok(preview)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Stop recording and hold the finished asset as `Ready`.
    pub async fn stop_capture(&self) -> PipelineResult<MediaSummary> {
        let report = self.capture.stop_capture().await;
        self.finish_capture(report).await
    }

    /// Wait until the recording ceiling stops the capture.
    pub async fn wait_for_auto_stop(&self) -> PipelineResult<MediaSummary> {
        let report = self.capture.wait_for_auto_stop().await;
        self.finish_capture(report).await
    }

    async fn finish_capture(
        &self,
        report: intervu_capture::CaptureResult<CaptureReport>,
    ) -> PipelineResult<MediaSummary> {
        match report {
            Ok(report) => {
                info!(
                    duration_ms = report.duration.as_millis() as u64,
                    auto_stopped = report.auto_stopped,
                    size_bytes = report.asset.size_bytes(),
                    "Recording finalized"
                );
                self.make_ready(report.asset).await
            }
            Err(e) => {
                let err = PipelineError::from(e);
                if err.kind().is_none() {
                    return Err(err);
                }
                Err(self.fail(err))
            }
        }
    }

    /// Accept a video file from disk. Type and size are checked before
    /// anything else happens.
    pub async fn accept_file(&self, path: impl AsRef<Path>) -> PipelineResult<MediaSummary> {
        self.begin_intake().await?;
        match accept_file(path, self.max_upload_bytes).await {
            Ok(asset) => self.make_ready(asset).await,
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Accept an in-memory selection.
    pub async fn accept_bytes(
        &self,
        source_name: &str,
        mime_type: Option<&str>,
        bytes: Bytes,
    ) -> PipelineResult<MediaSummary> {
        self.begin_intake().await?;
        match accept_bytes(source_name, mime_type, bytes, self.max_upload_bytes) {
            Ok(asset) => self.make_ready(asset).await,
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn make_ready(&self, asset: MediaAsset) -> PipelineResult<MediaSummary> {
        let summary = asset.summary();
        self.transition(PipelineState::Ready {
            asset: summary.clone(),
        })?;
        self.session.lock().await.asset = Some(asset);
        Ok(summary)
    }

    /// Return to `Idle` so a new asset can be taken in.
    async fn begin_intake(&self) -> PipelineResult<()> {
        if self.in_flight.available_permits() == 0 {
            return Err(PipelineError::busy(self.state().name()));
        }
        let state = self.state();
        if matches!(state, PipelineState::Capturing) {
            return Err(PipelineError::busy("capturing"));
        }
        if !matches!(state, PipelineState::Idle) {
            *self.session.lock().await = RunSession::default();
            self.transition(PipelineState::Idle)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Upload the ready asset, then analyze it by its stored path.
    ///
    /// After a failed upload the asset is kept, and calling this again from
    /// `Errored(UploadFailed)` retries the upload.
    pub async fn analyze_video(&self) -> PipelineResult<PipelineOutcome> {
        let mut run = self.begin_run("analyze_video")?;
        let asset = self.take_pending_asset(true).await?;

        let span = run.logger.create_span();
        async {
            run.logger.log_start(&format!(
                "{} ({} bytes)",
                asset.source_name(),
                asset.size_bytes()
            ));

            if let Err(e) = self.transition(PipelineState::Uploading) {
                self.keep_asset(asset).await;
                return Err(e);
            }
            let session = match self
                .cancellable(&mut run, self.uploads.upload(&asset, &self.requester.id))
                .await
            {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => return Err(self.fail(e.into())),
                Err(cancelled) => return Err(self.abandon(&run, cancelled).await),
            };

            let stored_path = match (session.succeeded(), session.stored_path.clone()) {
                (true, Some(path)) => path,
                _ => {
                    let message = session
                        .error
                        .clone()
                        .unwrap_or_else(|| GENERIC_NETWORK_ERROR.to_string());
                    run.logger.log_error(&message);
                    self.keep_asset(asset).await;
                    return Err(self.fail(PipelineError::UploadFailed(message)));
                }
            };
            // Stored durably; the local payload is no longer needed.
            drop(asset);

            run.logger.log_progress(&format!("uploaded to {}", stored_path));
            self.transition(PipelineState::Uploaded {
                stored_path: stored_path.clone(),
            })?;

            let request = self.request_for(AssetReference::Stored(stored_path));
            self.run_analysis(&mut run, request).await
        }
        .instrument(span)
        .await
    }

    /// Analyze the ready asset directly, attaching it to the analysis call.
    pub async fn analyze_direct(&self) -> PipelineResult<PipelineOutcome> {
        let mut run = self.begin_run("analyze_direct")?;
        let asset = self.take_pending_asset(false).await?;

        let span = run.logger.create_span();
        async {
            run.logger.log_start(&format!(
                "{} ({} bytes, inline)",
                asset.source_name(),
                asset.size_bytes()
            ));
            let request = self.request_for(AssetReference::Inline(asset));
            self.run_analysis(&mut run, request).await
        }
        .instrument(span)
        .await
    }

    /// Re-attempt a failed analysis without uploading again.
    pub async fn retry_analysis(&self) -> PipelineResult<PipelineOutcome> {
        let mut run = self.begin_run("retry_analysis")?;

        let recoverable = matches!(
            self.state(),
            PipelineState::Errored { kind } if kind.allows_reanalysis()
        );
        let request = match self.session.lock().await.retry.take() {
            Some(request) if recoverable => request,
            _ => return Err(PipelineError::NothingToRetry),
        };

        let span = run.logger.create_span();
        async {
            run.logger.log_start(&request.asset().video_reference());
            self.run_analysis(&mut run, request).await
        }
        .instrument(span)
        .await
    }

    async fn run_analysis(
        &self,
        run: &mut RunGuard,
        request: AnalysisRequest,
    ) -> PipelineResult<PipelineOutcome> {
        self.transition(PipelineState::Analyzing)?;

        let outcome = match self.cancellable(run, self.analysis.analyze(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let err = PipelineError::from(e);
                run.logger.log_error(&err.to_string());
                if err.is_recoverable() {
                    self.session.lock().await.retry = Some(request);
                }
                return Err(self.fail(err));
            }
            Err(cancelled) => return Err(self.abandon(run, cancelled).await),
        };

        if !self.close_cancellation() {
            return Err(self.abandon(run, PipelineError::Cancelled).await);
        }

        if !outcome.is_live() {
            run.logger.log_warning("both analysis endpoints failed, using degraded result");
        }
        self.transition(PipelineState::Analyzed {
            source: outcome.source,
        })?;

        let video_reference = request.asset().video_reference();
        match self
            .store
            .save(&self.requester, &outcome.result, &video_reference, outcome.source)
            .await
        {
            Ok(record) => {
                self.transition(PipelineState::Saved {
                    record_id: record.id.to_string(),
                })?;
                run.logger.log_completion(&format!(
                    "record {} saved (source: {})",
                    record.id, record.source
                ));
                metrics::counter!("intervu_pipeline_runs_total", "outcome" => "saved").increment(1);
                Ok(PipelineOutcome {
                    analysis: outcome,
                    record: Some(record),
                    persistence_error: None,
                })
            }
            Err(e) => {
                // The result stays displayable; the state remains `Analyzed`.
                warn!(owner_id = %self.requester.id, error = %e, "Failed to persist analysis");
                run.logger.log_warning(&format!("result not saved: {}", e));
                metrics::counter!("intervu_pipeline_persistence_failed_total").increment(1);
                metrics::counter!("intervu_pipeline_runs_total", "outcome" => "unsaved").increment(1);
                Ok(PipelineOutcome {
                    analysis: outcome,
                    record: None,
                    persistence_error: Some(e.to_string()),
                })
            }
        }
    }

    fn request_for(&self, asset: AssetReference) -> AnalysisRequest {
        let hints = ContextHints::for_requester(&self.requester).with_skills(self.skills.clone());
        AnalysisRequest::new(
            asset,
            INTERVIEW_ANALYSIS_PROMPT,
            self.requester.id.clone(),
            Some(hints),
        )
    }

    fn begin_run(&self, operation: &str) -> PipelineResult<RunGuard> {
        let permit = Arc::clone(&self.in_flight)
            .try_acquire_owned()
            .map_err(|_| PipelineError::busy(self.state().name()))?;

        let state = self.state();
        if !state.accepts_new_run() {
            return Err(PipelineError::busy(state.name()));
        }

        self.cancel_tx.send_replace(RunSignal::Open);
        Ok(RunGuard {
            _permit: permit,
            signal: Arc::clone(&self.cancel_tx),
            cancel_rx: self.cancel_tx.subscribe(),
            logger: PipelineLogger::new(operation, &self.requester.id),
        })
    }

    /// Take the asset held in `Ready`, or after a failed upload when
    /// `reupload` is set.
    async fn take_pending_asset(&self, reupload: bool) -> PipelineResult<MediaAsset> {
        let pending = match self.state() {
            PipelineState::Ready { .. } => true,
            PipelineState::Errored { kind } => reupload && kind.allows_reupload(),
            _ => false,
        };
        if !pending {
            return Err(PipelineError::NotReady);
        }
        self.session
            .lock()
            .await
            .asset
            .take()
            .ok_or(PipelineError::NotReady)
    }

    async fn keep_asset(&self, asset: MediaAsset) {
        self.session.lock().await.asset = Some(asset);
    }

    /// Run `fut` until it finishes or the run is cancelled. Cancelling drops
    /// the future, which aborts its in-flight request.
    async fn cancellable<F: Future>(&self, run: &mut RunGuard, fut: F) -> PipelineResult<F::Output> {
        tokio::select! {
            biased;
            Ok(_) = run.cancel_rx.wait_for(|signal| *signal == RunSignal::Requested) => {
                Err(PipelineError::Cancelled)
            }
            out = fut => Ok(out),
        }
    }

    /// Refuse cancellation from here on. Returns `false` if a cancel already arrived.
    fn close_cancellation(&self) -> bool {
        self.cancel_tx.send_replace(RunSignal::Closed) != RunSignal::Requested
    }

    async fn abandon(&self, run: &RunGuard, err: PipelineError) -> PipelineError {
        run.logger.log_warning("cancelled");
        *self.session.lock().await = RunSession::default();
        self.uploads.progress().reset();
        self.state_tx.send_replace(PipelineState::Idle);
        metrics::counter!("intervu_pipeline_runs_total", "outcome" => "cancelled").increment(1);
        err
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Cancel the in-flight upload or analysis, or discard a running capture.
    ///
    /// Returns `true` if something was cancelled; the pipeline then ends in
    /// `Idle`. A run that already has its analysis and is saving it cannot be
    /// cancelled and returns `false`.
    pub async fn cancel(&self) -> bool {
        let requested = self.cancel_tx.send_if_modified(|signal| {
            if *signal == RunSignal::Open {
                *signal = RunSignal::Requested;
                true
            } else {
                false
            }
        });
        if requested {
            info!(owner_id = %self.requester.id, "Cancelling in-flight run");
            return true;
        }
        if self.in_flight.available_permits() == 0 {
            info!(owner_id = %self.requester.id, "Run is saving its result, not cancelled");
            return false;
        }
        if self.capture.is_capturing().await {
            self.capture.discard().await;
            self.state_tx.send_replace(PipelineState::Idle);
            info!(owner_id = %self.requester.id, "Capture discarded");
            return true;
        }
        false
    }

    /// Drop any held asset or failed run and return to `Idle`.
    pub async fn reset(&self) -> PipelineResult<()> {
        if self.in_flight.available_permits() == 0 {
            return Err(PipelineError::busy(self.state().name()));
        }
        if self.capture.is_capturing().await {
            self.capture.discard().await;
        }
        *self.session.lock().await = RunSession::default();
        self.uploads.progress().reset();
        self.state_tx.send_replace(PipelineState::Idle);
        Ok(())
    }

    /// The requester's records, newest first. Safe to call while a run is in flight.
    pub fn history(&self) -> RecordStream {
        self.store.list(&self.requester.id)
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    fn transition(&self, next: PipelineState) -> PipelineResult<()> {
        let mut rejected = None;
        self.state_tx.send_if_modified(|state| {
            if state.can_transition_to(&next) {
                *state = next.clone();
                true
            } else {
                rejected = Some(PipelineError::InvalidTransition {
                    from: state.to_string(),
                    to: next.to_string(),
                });
                false
            }
        });
        match rejected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Move to `Errored` for failures that end the run.
    fn fail(&self, err: PipelineError) -> PipelineError {
        if let Some(kind) = err.kind() {
            let errored = PipelineState::Errored { kind };
            warn!(
                owner_id = %self.requester.id,
                kind = %kind,
                terminal = errored.is_terminal(),
                error = %err,
                "Pipeline run failed"
            );
            metrics::counter!("intervu_pipeline_errors_total", "kind" => kind.as_str()).increment(1);
            self.state_tx.send_if_modified(|state| {
                if state.can_transition_to(&errored) {
                    *state = errored;
                    true
                } else {
                    false
                }
            });
        }
        err
    }
}
