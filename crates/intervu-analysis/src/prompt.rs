//! Fixed instruction sent with every analysis request.

/// Instruction asking the model for exactly the `AnalysisResult` shape.
pub const INTERVIEW_ANALYSIS_PROMPT: &str = r#"You are an experienced interview coach. Watch the attached interview recording and evaluate the candidate.

IMPORTANT: You must strictly follow this output format.
Return ONLY a single JSON object with exactly these top-level keys:
{
  "overall_assessment": "Short summary of the whole performance",
  "speaking_skills": {
    "clarity": "...",
    "pace": "...",
    "tone": "...",
    "improvements": ["..."]
  },
  "body_language": {
    "posture": "...",
    "eye_contact": "...",
    "gestures": "...",
    "improvements": ["..."]
  },
  "confidence_and_presence": {
    "confidence_level": "...",
    "presence": "...",
    "improvements": ["..."]
  },
  "answer_quality": {
    "relevance": "...",
    "structure": "...",
    "depth": "...",
    "improvements": ["..."]
  },
  "final_action_plan": ["step 1", "step 2", "step 3"]
}

Additional instructions:
- Return ONLY the JSON object and nothing else: no markdown, no code fences, no commentary.
- Do not add keys that are not listed above.
- Every text field must be non-empty and every "improvements" list must have at least one entry.
- "final_action_plan" must contain 3 to 5 concrete, ordered steps.
"#;

/// Top-level keys the prompt asks for.
pub const RESULT_KEYS: [&str; 6] = [
    "overall_assessment",
    "speaking_skills",
    "body_language",
    "confidence_and_presence",
    "answer_quality",
    "final_action_plan",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_every_key() {
        for key in RESULT_KEYS {
            assert!(INTERVIEW_ANALYSIS_PROMPT.contains(&format!("\"{}\"", key)));
        }
    }
}
