//! Strict validation of untrusted analysis payloads.

use serde_json::Value;
use validator::Validate;

use intervu_models::AnalysisResult;

use crate::error::{AnalysisError, AnalyzeResult};

/// Validate a raw `analysis` value.
///
/// The value must be an object of exactly the `AnalysisResult` shape, or a
/// string containing exactly one such object. Surrounding prose or code fences
/// are rejected rather than scraped.
pub fn validate(raw: Value) -> AnalyzeResult<AnalysisResult> {
    let value = match raw {
        Value::Object(_) => raw,
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(&text).map_err(|e| {
                AnalysisError::schema_violation(format!("analysis text is not a JSON object: {}", e))
            })?;
            if !parsed.is_object() {
                return Err(AnalysisError::schema_violation(
                    "analysis text does not contain an object",
                ));
            }
            parsed
        }
        Value::Null => return Err(AnalysisError::schema_violation("analysis is missing")),
        other => {
            return Err(AnalysisError::schema_violation(format!(
                "analysis has unexpected type: {}",
                type_name(&other)
            )))
        }
    };

    let result: AnalysisResult = serde_json::from_value(value)
        .map_err(|e| AnalysisError::schema_violation(e.to_string()))?;

    result
        .validate()
        .map_err(|e| AnalysisError::schema_violation(e.to_string()))?;

    Ok(result)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
