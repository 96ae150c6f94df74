//! Structured run logging.
//!
//! Every line of one pipeline run carries the same run id and operation, so
//! a run can be followed end to end in JSON logs.

use tracing::{error, info, warn, Span};
use uuid::Uuid;

/// Logger for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    run_id: String,
    operation: String,
    owner_id: String,
}

impl PipelineLogger {
    /// Logger for a new run with a fresh id.
    pub fn new(operation: &str, owner_id: &str) -> Self {
        Self::with_run_id(&Uuid::new_v4().to_string(), operation, owner_id)
    }

    pub fn with_run_id(run_id: &str, operation: &str, owner_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            operation: operation.to_string(),
            owner_id: owner_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            owner_id = %self.owner_id,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            owner_id = %self.owner_id,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span to instrument the run's futures with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "pipeline_run",
            run_id = %self.run_id,
            operation = %self.operation,
            owner_id = %self.owner_id
        )
    }
}
