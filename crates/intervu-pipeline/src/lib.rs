//! Interview recording pipeline.
//!
//! This crate provides:
//! - The pipeline controller: capture or file intake, upload, analysis,
//!   persistence and history behind one state machine
//! - Cancellation of in-flight runs and a single-run guard
//! - Environment configuration and structured run logging

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;

pub use config::{PipelineConfig, StoreBackend, UploadBackend};
pub use controller::{PipelineController, PipelineOutcome};
pub use error::{PipelineError, PipelineResult};
pub use logging::PipelineLogger;
