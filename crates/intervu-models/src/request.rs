//! Analysis request models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::media::MediaAsset;

/// Identity of the user the pipeline runs for, supplied by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Requester {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Requester {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Optional context forwarded to the analysis endpoint as JSON.
///
/// Serialized with the endpoint's field names (`studentId`, `studentName`, `skills`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

impl ContextHints {
    /// Hints derived from the requester identity.
    pub fn for_requester(requester: &Requester) -> Self {
        Self {
            student_id: Some(requester.id.clone()),
            student_name: requester.display_name.clone(),
            skills: Vec::new(),
        }
    }

    pub fn with_skills(mut self, skills: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }
}

/// The video an analysis refers to.
#[derive(Debug, Clone)]
pub enum AssetReference {
    /// Already uploaded; only the stored path travels.
    Stored(String),
    /// Not uploaded; the payload is attached to the analysis call.
    Inline(MediaAsset),
}

impl AssetReference {
    /// Reference string persisted alongside the result.
    pub fn video_reference(&self) -> String {
        match self {
            AssetReference::Stored(path) => path.clone(),
            AssetReference::Inline(asset) => format!("inline:{}", asset.source_name()),
        }
    }
}

/// Immutable request for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    asset: AssetReference,
    prompt_text: String,
    requester_id: String,
    context_hints: Option<ContextHints>,
}

impl AnalysisRequest {
    pub fn new(
        asset: AssetReference,
        prompt_text: impl Into<String>,
        requester_id: impl Into<String>,
        context_hints: Option<ContextHints>,
    ) -> Self {
        Self {
            asset,
            prompt_text: prompt_text.into(),
            requester_id: requester_id.into(),
            context_hints,
        }
    }

    pub fn asset(&self) -> &AssetReference {
        &self.asset
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    pub fn context_hints(&self) -> Option<&ContextHints> {
        self.context_hints.as_ref()
    }
}
