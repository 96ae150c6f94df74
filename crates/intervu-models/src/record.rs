//! Persisted analysis record.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AnalysisResult, AnalysisSource};

/// Unique identifier for a persisted analysis record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generate a new random record ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One immutable, persisted analysis outcome owned by a user.
///
/// Records are never updated; a new analysis creates a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisRecord {
    pub id: RecordId,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    pub result: AnalysisResult,
    /// Stored asset path or URL
    pub video_reference: String,
    /// Marks degraded substitutes so history never passes them off as live
    pub source: AnalysisSource,
    /// Assigned by the store at write time
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn is_live(&self) -> bool {
        self.source.is_live()
    }
}
