//! Upload progress tracking.
//!
//! One tracker is shared between the transport and the host. Reported values
//! never decrease, and 100 is only reachable through [`ProgressTracker::complete`],
//! which callers invoke after the server has confirmed the transfer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, Stream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Highest value reportable before the server confirms the transfer.
pub const PRE_CONFIRM_CAP: u8 = 99;

/// Upper bound of the simulated ramp used by transports without byte progress.
pub const SIMULATED_RAMP_CAP: u8 = 95;

/// Chunk size for streamed request bodies.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// Monotonic progress channel (0-100).
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    tx: Arc<watch::Sender<u8>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }

    /// Report a percentage. Lower values are ignored and the value is capped
    /// below 100.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(PRE_CONFIRM_CAP);
        self.tx.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    /// Report bytes transferred over total.
    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (sent.min(total) * 100 / total) as u8;
        self.report(percent);
    }

    /// Mark the transfer as confirmed by the server.
    pub fn complete(&self) {
        self.tx.send_replace(100);
    }

    /// Start a new session on the same channel.
    pub fn reset(&self) {
        self.tx.send_replace(0);
    }
}

/// Build a streamed request body that reports progress as chunks are consumed.
///
/// A chunk counts as transferred when the transport polls for the next one.
pub fn progress_body(data: Bytes, tracker: ProgressTracker) -> reqwest::Body {
    reqwest::Body::wrap_stream(progress_stream(data, tracker))
}

fn progress_stream(
    data: Bytes,
    tracker: ProgressTracker,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = data.len() as u64;

    stream::unfold((data, 0usize), move |(data, offset)| {
        let tracker = tracker.clone();
        async move {
            tracker.report_bytes(offset as u64, total);
            if offset >= data.len() {
                return None;
            }
            let end = (offset + BODY_CHUNK_SIZE).min(data.len());
            let chunk = data.slice(offset..end);
            Some((Ok(chunk), (data, end)))
        }
    })
}

/// Monotonic simulated ramp for transports that expose no byte progress.
///
/// The ramp approaches [`SIMULATED_RAMP_CAP`] with shrinking steps and stops
/// when the guard is dropped.
pub struct SimulatedRamp {
    handle: JoinHandle<()>,
}

impl SimulatedRamp {
    pub fn start(tracker: ProgressTracker, tick: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                let current = tracker.current();
                if current >= SIMULATED_RAMP_CAP {
                    break;
                }
                let step = ((SIMULATED_RAMP_CAP - current) / 8).max(1);
                tracker.report(current + step);
            }
        });
        Self { handle }
    }
}

impl Drop for SimulatedRamp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
