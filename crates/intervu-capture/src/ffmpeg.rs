//! FFmpeg-backed capture devices.
//!
//! FFmpeg reads from the platform capture API and writes a live WebM stream to
//! stdout. Sending `q` on stdin makes it finalize the container and exit.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::{CaptureConstraints, MediaDevices, MediaStream, PreviewHandle};
use crate::error::{CaptureError, CaptureResult};

/// Time allowed for FFmpeg to fail on device access before the stream counts as open.
const STARTUP_GRACE: Duration = Duration::from_millis(1500);

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Platform device names passed to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegDeviceConfig {
    pub video_device: String,
    pub audio_device: String,
}

impl Default for FfmpegDeviceConfig {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self {
                video_device: "0".to_string(),
                audio_device: "0".to_string(),
            }
        } else {
            Self {
                video_device: "/dev/video0".to_string(),
                audio_device: "default".to_string(),
            }
        }
    }
}

impl FfmpegDeviceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            video_device: std::env::var("INTERVU_FFMPEG_VIDEO_DEVICE")
                .unwrap_or(defaults.video_device),
            audio_device: std::env::var("INTERVU_FFMPEG_AUDIO_DEVICE")
                .unwrap_or(defaults.audio_device),
        }
    }
}

/// Camera and microphone through an FFmpeg child process.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDevices {
    config: FfmpegDeviceConfig,
}

impl FfmpegDevices {
    pub fn new(config: FfmpegDeviceConfig) -> Self {
        Self { config }
    }

    /// Build the FFmpeg arguments for this platform.
    pub fn build_args(&self, constraints: &CaptureConstraints) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        if cfg!(target_os = "macos") {
            let video = if constraints.video {
                self.config.video_device.as_str()
            } else {
                "none"
            };
            let audio = if constraints.audio {
                self.config.audio_device.as_str()
            } else {
                "none"
            };
            args.extend([
                "-f".into(),
                "avfoundation".into(),
                "-framerate".into(),
                "30".into(),
                "-i".into(),
                format!("{}:{}", video, audio),
            ]);
        } else {
            if constraints.video {
                args.extend([
                    "-f".into(),
                    "v4l2".into(),
                    "-i".into(),
                    self.config.video_device.clone(),
                ]);
            }
            if constraints.audio {
                args.extend([
                    "-f".into(),
                    "alsa".into(),
                    "-i".into(),
                    self.config.audio_device.clone(),
                ]);
            }
        }

        if constraints.video {
            args.extend(["-c:v".into(), "libvpx".into(), "-deadline".into(), "realtime".into()]);
        }
        if constraints.audio {
            args.extend(["-c:a".into(), "libopus".into()]);
        }
        args.extend(["-f".into(), "webm".into(), "pipe:1".into()]);
        args
    }

    fn source_description(&self) -> String {
        if cfg!(target_os = "macos") {
            format!("avfoundation:{}:{}", self.config.video_device, self.config.audio_device)
        } else {
            format!("v4l2:{}", self.config.video_device)
        }
    }
}

#[async_trait]
impl MediaDevices for FfmpegDevices {
    async fn open(&self, constraints: &CaptureConstraints) -> CaptureResult<Box<dyn MediaStream>> {
        if !constraints.video && !constraints.audio {
            return Err(CaptureError::capture_failed("nothing to capture"));
        }

        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| CaptureError::permission_denied("no capture backend: ffmpeg not found in PATH"))?;

        let args = self.build_args(constraints);
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::permission_denied(format!("failed to start capture: {}", e)))?;

        // Device access problems make FFmpeg exit almost immediately.
        if let Ok(status) = tokio::time::timeout(STARTUP_GRACE, child.wait()).await {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            let code = status.ok().and_then(|s| s.code());
            return Err(classify_startup_failure(&stderr, code));
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::capture_failed("FFmpeg stdout unavailable"))?;
        let stdin = child.stdin.take();
        // FFmpeg blocks once the stderr pipe fills, so keep it drained for the whole recording.
        let stderr_task = child.stderr.take().map(drain_stderr);

        let preview = PreviewHandle {
            stream_id: Uuid::new_v4().to_string(),
            source: self.source_description(),
        };
        info!(source = %preview.source, "Capture devices opened");

        Ok(Box::new(FfmpegStream {
            child,
            stdout,
            stdin,
            preview,
            mime_type: constraints.mime_type.clone(),
            stderr_task,
            released: false,
        }))
    }
}

/// Map an early FFmpeg exit to a capture error.
pub fn classify_startup_failure(stderr: &str, exit_code: Option<i32>) -> CaptureError {
    let lower = stderr.to_ascii_lowercase();
    let access_markers = [
        "permission denied",
        "not authorized",
        "device or resource busy",
        "no such file or directory",
        "no such device",
        "cannot open",
        "could not open",
        "input/output error",
    ];

    let detail = stderr.lines().last().unwrap_or("capture device unavailable").trim();
    if access_markers.iter().any(|m| lower.contains(m)) {
        CaptureError::permission_denied(detail.to_string())
    } else {
        CaptureError::capture_failed(format!(
            "FFmpeg exited during startup (code {:?}): {}",
            exit_code, detail
        ))
    }
}

/// Read FFmpeg's diagnostics until EOF, logging them at debug level.
/// Resolves to the number of lines read.
fn drain_stderr<R>(stderr: R) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut count = 0;
        while let Ok(Some(line)) = lines.next_line().await {
            count += 1;
            debug!(target: "ffmpeg", "{}", line);
        }
        count
    })
}

struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
    stdin: Option<ChildStdin>,
    preview: PreviewHandle,
    mime_type: String,
    stderr_task: Option<JoinHandle<usize>>,
    released: bool,
}

#[async_trait]
impl MediaStream for FfmpegStream {
    fn preview(&self) -> PreviewHandle {
        self.preview.clone()
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn next_chunk(&mut self) -> CaptureResult<Option<Bytes>> {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let n = self.stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    async fn stop(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                warn!("Failed to ask FFmpeg to stop: {}", e);
            }
        }
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stdin = None;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill FFmpeg capture process: {}", e);
                }
            }
        }
        debug!(stream_id = %self.preview.stream_id, "Capture devices released");
    }
}
