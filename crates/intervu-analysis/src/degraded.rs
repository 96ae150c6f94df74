//! Canned result used when no live analysis could be obtained.

use intervu_models::{
    AnalysisResult, AnswerQuality, BodyLanguage, ConfidenceAndPresence, SpeakingSkills,
};

const NOTICE: &str = "Live analysis is unavailable right now.";

/// Fixed, clearly-labeled substitute result.
///
/// It carries no information about the recording. It goes through the same
/// validator as live results before it is used.
pub fn degraded_result() -> AnalysisResult {
    AnalysisResult {
        overall_assessment: format!(
            "{} This is general interview guidance, not feedback on your recording. Try again later for a personal analysis.",
            NOTICE
        ),
        speaking_skills: SpeakingSkills {
            clarity: format!("{} Aim for short, complete sentences.", NOTICE),
            pace: "Not assessed. A steady pace with brief pauses between points works well.".into(),
            tone: "Not assessed. Keep a warm, conversational tone.".into(),
            improvements: vec![
                "Pause briefly before answering to organize your thoughts".into(),
                "Avoid filler words such as \"um\" and \"like\"".into(),
            ],
        },
        body_language: BodyLanguage {
            posture: "Not assessed. Sit upright with relaxed shoulders.".into(),
            eye_contact: "Not assessed. Look at the camera when making key points.".into(),
            gestures: "Not assessed. Keep gestures open and within the frame.".into(),
            improvements: vec!["Check your framing and lighting before recording".into()],
        },
        confidence_and_presence: ConfidenceAndPresence {
            confidence_level: "Not assessed.".into(),
            presence: "Not assessed. Show interest by leaning in slightly.".into(),
            improvements: vec!["Open each answer with a direct statement".into()],
        },
        answer_quality: AnswerQuality {
            relevance: "Not assessed. Answer the question that was asked first.".into(),
            structure: "Not assessed. The STAR method (Situation, Task, Action, Result) keeps answers focused.".into(),
            depth: "Not assessed. Support claims with a concrete example.".into(),
            improvements: vec!["Prepare two or three stories you can adapt to common questions".into()],
        },
        final_action_plan: vec![
            "Retry the analysis when the service is available".into(),
            "Practice one answer using the STAR method".into(),
            "Record a short answer and review your pace and eye contact".into(),
        ],
    }
}
