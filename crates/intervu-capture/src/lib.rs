//! Recording intake for interview videos.
//!
//! This crate provides:
//! - A device seam (`MediaDevices` / `MediaStream`) with an FFmpeg backend
//! - The capture controller with its hard recording ceiling
//! - File and in-memory intake with local type/size checks

pub mod controller;
pub mod device;
pub mod error;
pub mod ffmpeg;
pub mod file;

pub use controller::{CaptureController, CaptureReport, CaptureSettings, MAX_RECORDING_DURATION};
pub use device::{CaptureConstraints, MediaDevices, MediaStream, PreviewHandle};
pub use error::{CaptureError, CaptureResult};
pub use ffmpeg::{FfmpegDeviceConfig, FfmpegDevices};
pub use file::{accept_bytes, accept_file};
