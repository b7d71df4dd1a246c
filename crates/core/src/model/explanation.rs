use serde::{Deserialize, Serialize};

use crate::error::{SchemaViolation, require_text};
use crate::model::ids::QuestionId;
use crate::model::question::Question;

/// Hint plus worked explanation for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub question_id: QuestionId,
    pub hint: String,
    pub explanation: String,
}

/// One explanation per question, in question order, with non-empty text.
///
/// # Errors
///
/// Returns `SchemaViolation` naming the first offending explanation.
pub fn validate_explanations(
    questions: &[Question],
    explanations: &[Explanation],
) -> Result<(), SchemaViolation> {
    if explanations.len() != questions.len() {
        return Err(SchemaViolation::new(
            "explanations",
            format!(
                "one explanation per question ({}), got {}",
                questions.len(),
                explanations.len()
            ),
        ));
    }
    for (index, (question, item)) in questions.iter().zip(explanations).enumerate() {
        let path = format!("explanations[{index}]");
        if item.question_id != question.id {
            return Err(SchemaViolation::new(
                format!("{path}.question_id"),
                format!("question {} in question order", question.id),
            ));
        }
        require_text("hint", &item.hint).map_err(|v| v.within(&path))?;
        require_text("explanation", &item.explanation).map_err(|v| v.within(&path))?;
    }
    Ok(())
}
