//! Interview analysis result models.
//!
//! `AnalysisResult` is the exact shape the analysis endpoints are instructed to
//! return. Every struct denies unknown fields so an untrusted response either
//! matches the schema completely or is rejected.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Minimum number of steps in the final action plan.
pub const MIN_ACTION_PLAN_STEPS: u64 = 3;

/// Maximum number of steps in the final action plan.
pub const MAX_ACTION_PLAN_STEPS: u64 = 5;

/// Structured multi-dimensional feedback for one interview recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct AnalysisResult {
    /// Short narrative summary of the whole performance
    #[validate(custom(function = "non_blank"))]
    pub overall_assessment: String,

    #[validate(nested)]
    pub speaking_skills: SpeakingSkills,

    #[validate(nested)]
    pub body_language: BodyLanguage,

    #[validate(nested)]
    pub confidence_and_presence: ConfidenceAndPresence,

    #[validate(nested)]
    pub answer_quality: AnswerQuality,

    /// Ordered next steps, 3 to 5 entries
    #[validate(
        length(min = 3, max = 5),
        custom(function = "non_blank_items")
    )]
    pub final_action_plan: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct SpeakingSkills {
    #[validate(custom(function = "non_blank"))]
    pub clarity: String,
    #[validate(custom(function = "non_blank"))]
    pub pace: String,
    #[validate(custom(function = "non_blank"))]
    pub tone: String,
    #[validate(length(min = 1), custom(function = "non_blank_items"))]
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct BodyLanguage {
    #[validate(custom(function = "non_blank"))]
    pub posture: String,
    #[validate(custom(function = "non_blank"))]
    pub eye_contact: String,
    #[validate(custom(function = "non_blank"))]
    pub gestures: String,
    #[validate(length(min = 1), custom(function = "non_blank_items"))]
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct ConfidenceAndPresence {
    #[validate(custom(function = "non_blank"))]
    pub confidence_level: String,
    #[validate(custom(function = "non_blank"))]
    pub presence: String,
    #[validate(length(min = 1), custom(function = "non_blank_items"))]
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct AnswerQuality {
    #[validate(custom(function = "non_blank"))]
    pub relevance: String,
    #[validate(custom(function = "non_blank"))]
    pub structure: String,
    #[validate(custom(function = "non_blank"))]
    pub depth: String,
    #[validate(length(min = 1), custom(function = "non_blank_items"))]
    pub improvements: Vec<String>,
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn non_blank_items(items: &[String]) -> Result<(), ValidationError> {
    if items.iter().any(|item| item.trim().is_empty()) {
        return Err(ValidationError::new("blank_item"));
    }
    Ok(())
}

impl AnalysisResult {
    /// JSON schema of the result, for hosts that want to show or check it.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisResult)
    }
}

/// Where a final result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Live analysis from the primary endpoint
    #[default]
    Primary,
    /// Live analysis from the fallback endpoint
    Fallback,
    /// Canned substitute used after both endpoints failed
    Degraded,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Degraded => "degraded",
        }
    }

    /// Parse the persisted representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "fallback" => Some(Self::Fallback),
            "degraded" => Some(Self::Degraded),
            _ => None,
        }
    }

    /// True if the result is a real analysis of the recording.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Degraded)
    }
}

impl std::fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
