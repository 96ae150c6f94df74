//! Capture session controller.
//!
//! A session owns the device stream from `start_capture` until the recording
//! is finalized. The recorder task releases the stream on every exit path:
//! manual stop, hard timeout, device failure, or the controller being dropped.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use intervu_models::{MediaAsset, MAX_MEDIA_BYTES};

use crate::device::{CaptureConstraints, MediaDevices, MediaStream, PreviewHandle};
use crate::error::{CaptureError, CaptureResult};

/// Hard ceiling on a single recording.
pub const MAX_RECORDING_DURATION: Duration = Duration::from_secs(120);

/// How long to wait for the device to flush after a stop request.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture settings.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub max_duration: Duration,
    pub max_bytes: u64,
    pub constraints: CaptureConstraints,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_duration: MAX_RECORDING_DURATION,
            max_bytes: MAX_MEDIA_BYTES,
            constraints: CaptureConstraints::default(),
        }
    }
}

/// A finalized recording.
#[derive(Debug)]
pub struct CaptureReport {
    pub asset: MediaAsset,
    pub duration: Duration,
    /// The recording hit the time ceiling rather than being stopped
    pub auto_stopped: bool,
}

struct ActiveCapture {
    stop_tx: watch::Sender<bool>,
    finished_rx: watch::Receiver<bool>,
    handle: JoinHandle<CaptureResult<CaptureReport>>,
    preview: PreviewHandle,
}

/// Records one session at a time from a [`MediaDevices`] backend.
pub struct CaptureController {
    devices: Arc<dyn MediaDevices>,
    settings: CaptureSettings,
    active: Mutex<Option<ActiveCapture>>,
}

impl CaptureController {
    pub fn new(devices: Arc<dyn MediaDevices>, settings: CaptureSettings) -> Self {
        Self {
            devices,
            settings,
            active: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub async fn is_capturing(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Preview of the running session, if any.
    pub async fn preview(&self) -> Option<PreviewHandle> {
        self.active.lock().await.as_ref().map(|a| a.preview.clone())
    }

    /// Open the devices and start recording immediately.
    pub async fn start_capture(&self) -> CaptureResult<PreviewHandle> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let stream = self.devices.open(&self.settings.constraints).await?;
        let preview = stream.preview();

        let (stop_tx, stop_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(false);
        let handle = tokio::spawn(record(
            stream,
            stop_rx,
            finished_tx,
            self.settings.clone(),
        ));

        info!(stream_id = %preview.stream_id, source = %preview.source, "Capture started");
        metrics::counter!("intervu_capture_started_total").increment(1);

        *active = Some(ActiveCapture {
            stop_tx,
            finished_rx,
            handle,
            preview: preview.clone(),
        });
        Ok(preview)
    }

    /// Stop recording and finalize the asset.
    pub async fn stop_capture(&self) -> CaptureResult<CaptureReport> {
        let active = self
            .active
            .lock()
            .await
            .take()
            .ok_or(CaptureError::NotCapturing)?;

        active.stop_tx.send_replace(true);
        join(active.handle).await
    }

    /// Wait for the running session to end on its own, normally by timeout.
    pub async fn wait_for_auto_stop(&self) -> CaptureResult<CaptureReport> {
        let mut finished = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| a.finished_rx.clone())
            .ok_or(CaptureError::NotCapturing)?;

        // An error means the recorder is gone, which also ends the wait.
        let _ = finished.wait_for(|done| *done).await;

        let active = self
            .active
            .lock()
            .await
            .take()
            .ok_or(CaptureError::NotCapturing)?;
        join(active.handle).await
    }

    /// Abandon the running session, discarding what was recorded.
    pub async fn discard(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.stop_tx.send_replace(true);
            let _ = active.handle.await;
            debug!("Capture discarded");
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.stop_tx.send_replace(true);
        }
    }
}

async fn join(handle: JoinHandle<CaptureResult<CaptureReport>>) -> CaptureResult<CaptureReport> {
    handle
        .await
        .map_err(|e| CaptureError::capture_failed(format!("recorder task failed: {}", e)))?
}

async fn record(
    mut stream: Box<dyn MediaStream>,
    mut stop_rx: watch::Receiver<bool>,
    finished_tx: watch::Sender<bool>,
    settings: CaptureSettings,
) -> CaptureResult<CaptureReport> {
    let started = Instant::now();
    let mut buffer = BytesMut::new();
    let mut auto_stopped = false;

    let deadline = tokio::time::sleep(settings.max_duration);
    tokio::pin!(deadline);

    // Ok(true) means the device still has to be stopped and drained.
    let recorded: CaptureResult<bool> = loop {
        tokio::select! {
            biased;
            _ = &mut deadline => {
                auto_stopped = true;
                break Ok(true);
            }
            _ = stop_rx.changed() => break Ok(true),
            chunk = stream.next_chunk() => match chunk {
                Ok(Some(chunk)) => buffer.extend_from_slice(&chunk),
                Ok(None) => break Ok(false),
                Err(e) => break Err(e),
            },
        }
    };

    let outcome = match recorded {
        Ok(true) => {
            stream.stop().await;
            drain(stream.as_mut(), &mut buffer).await
        }
        Ok(false) => Ok(()),
        Err(e) => Err(e),
    };

    stream.release().await;
    finished_tx.send_replace(true);
    outcome?;

    let duration = started.elapsed();
    if buffer.is_empty() {
        return Err(CaptureError::EmptyRecording);
    }

    let mime_type = stream.mime_type().to_string();
    let source_name = format!("recording-{}.{}", Uuid::new_v4(), extension_for(&mime_type));
    let asset = MediaAsset::with_limit(buffer.freeze(), mime_type, source_name, settings.max_bytes)?;

    info!(
        size_bytes = asset.size_bytes(),
        duration_ms = duration.as_millis() as u64,
        auto_stopped,
        "Capture finalized"
    );
    if auto_stopped {
        metrics::counter!("intervu_capture_auto_stopped_total").increment(1);
    }

    Ok(CaptureReport {
        asset,
        duration,
        auto_stopped,
    })
}

async fn drain(stream: &mut dyn MediaStream, buffer: &mut BytesMut) -> CaptureResult<()> {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(chunk) = stream.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok::<(), CaptureError>(())
    })
    .await;

    match drained {
        Ok(result) => result,
        Err(_) => {
            warn!("Device did not finish within {:?}, keeping data received so far", DRAIN_TIMEOUT);
            Ok(())
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or_default().trim() {
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        _ => "webm",
    }
}
