use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{SchemaViolation, require_text};
use crate::model::ids::QuestionId;
use crate::model::plan::WorksheetPlan;
use crate::model::tag::SkillTag;

//
// ─── QUESTION TYPES ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

impl ChoiceOption {
    #[must_use]
    pub fn new(text: impl Into<String>, correct: bool) -> Self {
        Self {
            text: text.into(),
            correct,
        }
    }
}

/// The answer format of a question together with its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        options: Vec<ChoiceOption>,
    },
    ShortAnswer {
        canonical: String,
        #[serde(default)]
        variants: Vec<String>,
    },
}

/// A single worksheet question. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    pub skill: SkillTag,
    pub difficulty: Difficulty,
}

impl Question {
    #[must_use]
    pub fn is_multiple_choice(&self) -> bool {
        matches!(self.kind, QuestionKind::MultipleChoice { .. })
    }

    /// The answer key in display form: the correct option text or the canonical answer.
    #[must_use]
    pub fn expected_answer(&self) -> Option<&str> {
        match &self.kind {
            QuestionKind::MultipleChoice { options } => options
                .iter()
                .find(|option| option.correct)
                .map(|option| option.text.as_str()),
            QuestionKind::ShortAnswer { canonical, .. } => Some(canonical.as_str()),
        }
    }

    /// Map a raw response to an option index.
    ///
    /// Accepts the 1-based option position or the option text (case-insensitive).
    /// Always `None` for short-answer questions.
    #[must_use]
    pub fn resolve_choice(&self, raw: &str) -> Option<usize> {
        let QuestionKind::MultipleChoice { options } = &self.kind else {
            return None;
        };
        let trimmed = raw.trim();
        if let Ok(position) = trimmed.parse::<usize>() {
            if (1..=options.len()).contains(&position) {
                return Some(position - 1);
            }
        }
        options
            .iter()
            .position(|option| option.text.trim().eq_ignore_ascii_case(trimmed))
    }

    /// # Errors
    ///
    /// Returns `SchemaViolation` if the question is not internally consistent.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        require_text("prompt", &self.prompt)?;
        match &self.kind {
            QuestionKind::MultipleChoice { options } => {
                if options.len() < 2 {
                    return Err(SchemaViolation::new("options", "at least two options"));
                }
                for (index, option) in options.iter().enumerate() {
                    require_text(&format!("options[{index}].text"), &option.text)?;
                }
                let correct = options.iter().filter(|option| option.correct).count();
                if correct != 1 {
                    return Err(SchemaViolation::new(
                        "options",
                        format!("exactly one correct option, found {correct}"),
                    ));
                }
            }
            QuestionKind::ShortAnswer { canonical, .. } => {
                require_text("canonical", canonical)?;
            }
        }
        Ok(())
    }
}

//
// ─── QUESTION SET VALIDATION ───────────────────────────────────────────────────
//

/// Validate generated questions against each other and against the plan.
///
/// # Errors
///
/// Returns `SchemaViolation` naming the first offending field.
pub fn validate_question_set(
    questions: &[Question],
    plan: &WorksheetPlan,
) -> Result<(), SchemaViolation> {
    if questions.is_empty() {
        return Err(SchemaViolation::new("questions", "at least one question"));
    }
    let planned = usize::try_from(plan.total_questions).unwrap_or(usize::MAX);
    if questions.len() != planned {
        return Err(SchemaViolation::new(
            "questions",
            format!("{planned} questions as planned, got {}", questions.len()),
        ));
    }

    let mut seen = HashSet::with_capacity(questions.len());
    for (index, question) in questions.iter().enumerate() {
        let path = format!("questions[{index}]");
        if !seen.insert(question.id) {
            return Err(SchemaViolation::new(
                format!("{path}.id"),
                "an id unique within the worksheet",
            ));
        }
        question.validate().map_err(|v| v.within(&path))?;
    }

    let multiple_choice = questions.iter().filter(|q| q.is_multiple_choice()).count();
    let planned_mc = usize::try_from(plan.multiple_choice).unwrap_or(usize::MAX);
    if multiple_choice != planned_mc {
        return Err(SchemaViolation::new(
            "questions",
            format!("{planned_mc} multiple-choice questions as planned, got {multiple_choice}"),
        ));
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
