//! Analysis error types.

use thiserror::Error;

use intervu_storage::StorageError;

/// Result type for analysis operations.
pub type AnalyzeResult<T> = Result<T, AnalysisError>;

/// Errors that can occur while obtaining an analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Request to {endpoint} failed: {message}")]
    RequestFailed { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {message}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("{endpoint} reported failure: {message}")]
    Unsuccessful { endpoint: String, message: String },

    #[error("{endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    #[error("Response does not match the analysis schema: {0}")]
    SchemaViolation(String),

    #[error("All analysis endpoints failed: {}", .failures.join("; "))]
    AllEndpointsFailed { failures: Vec<String> },
}

impl AnalysisError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn schema_violation(msg: impl Into<String>) -> Self {
        Self::SchemaViolation(msg.into())
    }

    pub fn request_failed(endpoint: &str, msg: impl Into<String>) -> Self {
        Self::RequestFailed {
            endpoint: endpoint.to_string(),
            message: msg.into(),
        }
    }

    /// Failures that move the chain to the next endpoint.
    pub fn is_endpoint_failure(&self) -> bool {
        !matches!(
            self,
            AnalysisError::ConfigError(_) | AnalysisError::Unauthenticated(_)
        )
    }
}

impl From<StorageError> for AnalysisError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unauthenticated(msg) => AnalysisError::Unauthenticated(msg),
            other => AnalysisError::ConfigError(other.to_string()),
        }
    }
}
