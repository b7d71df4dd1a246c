use serde::{Deserialize, Serialize};

use crate::error::SchemaViolation;
use crate::model::answer::Answer;
use crate::model::ids::QuestionId;

//
// ─── MISTAKE TAXONOMY ──────────────────────────────────────────────────────────
//

/// Category assigned to every evaluated answer.
///
/// `Correct` is the only category allowed on a correct evaluation, and the only one
/// not allowed on an incorrect one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MistakeType {
    Correct,
    MinorError,
    CalculationError,
    ConceptualError,
    Guess,
    Blank,
    Incorrect,
}

impl MistakeType {
    pub const ALL: [MistakeType; 7] = [
        MistakeType::Correct,
        MistakeType::MinorError,
        MistakeType::CalculationError,
        MistakeType::ConceptualError,
        MistakeType::Guess,
        MistakeType::Blank,
        MistakeType::Incorrect,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MistakeType::Correct => "correct",
            MistakeType::MinorError => "minor_error",
            MistakeType::CalculationError => "calculation_error",
            MistakeType::ConceptualError => "conceptual_error",
            MistakeType::Guess => "guess",
            MistakeType::Blank => "blank",
            MistakeType::Incorrect => "incorrect",
        }
    }
}

//
// ─── EVALUATION ────────────────────────────────────────────────────────────────
//

/// Verdict on a single answer. Produced once per answer and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub question_id: QuestionId,
    pub correct: bool,
    pub mistake: MistakeType,
    /// Partial credit in `[0, 1]`.
    pub score: f64,
    pub rationale: String,
}

impl Evaluation {
    /// # Errors
    ///
    /// Returns `SchemaViolation` for an out-of-range score or a mistake type that
    /// contradicts `correct`.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(SchemaViolation::new("score", "a number within [0, 1]"));
        }
        if self.correct != (self.mistake == MistakeType::Correct) {
            return Err(SchemaViolation::new(
                "mistake",
                "`correct` exactly when the answer is correct",
            ));
        }
        Ok(())
    }
}

/// Check evaluator output against the answers it was asked to grade.
///
/// Evaluations must be one per answer and in the same order.
///
/// # Errors
///
/// Returns `SchemaViolation` naming the first offending evaluation.
pub fn validate_evaluations(
    answers: &[Answer],
    evaluations: &[Evaluation],
) -> Result<(), SchemaViolation> {
    if evaluations.len() != answers.len() {
        return Err(SchemaViolation::new(
            "evaluations",
            format!("one evaluation per answer ({}), got {}", answers.len(), evaluations.len()),
        ));
    }
    for (index, (answer, evaluation)) in answers.iter().zip(evaluations).enumerate() {
        let path = format!("evaluations[{index}]");
        if evaluation.question_id != answer.question_id {
            return Err(SchemaViolation::new(
                format!("{path}.question_id"),
                format!("question {} in question order", answer.question_id),
            ));
        }
        evaluation.validate().map_err(|v| v.within(&path))?;
    }
    Ok(())
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Worksheet-level score derived from the evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_questions: u32,
    pub correct: u32,
    pub total_score: f64,
    pub max_score: f64,
    pub percentage: f64,
}

impl EvaluationSummary {
    #[must_use]
    pub fn from_evaluations(evaluations: &[Evaluation]) -> Self {
        let total_questions = u32::try_from(evaluations.len()).unwrap_or(u32::MAX);
        let correct = u32::try_from(evaluations.iter().filter(|e| e.correct).count())
            .unwrap_or(u32::MAX);
        let total_score: f64 = evaluations.iter().map(|e| e.score).sum();
        let max_score = f64::from(total_questions);
        let percentage = if max_score > 0.0 {
            (total_score / max_score * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            total_questions,
            correct,
            total_score,
            max_score,
            percentage,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
