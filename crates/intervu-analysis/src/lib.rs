//! Interview analysis orchestration.
//!
//! This crate provides:
//! - One HTTP client for the primary and fallback analysis endpoints
//! - Strict validation of the returned analysis
//! - The sequential primary → fallback → degraded chain

pub mod degraded;
pub mod endpoint;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod validator;

pub use degraded::degraded_result;
pub use endpoint::{AnalysisEndpoint, HttpAnalysisEndpoint};
pub use error::{AnalysisError, AnalyzeResult};
pub use orchestrator::{AnalysisOrchestrator, AnalysisOutcome, OrchestratorConfig};
pub use prompt::INTERVIEW_ANALYSIS_PROMPT;
pub use validator::validate;
