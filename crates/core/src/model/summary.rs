use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::evaluation::{Evaluation, EvaluationSummary, MistakeType};
use crate::model::ids::{SessionId, StudentId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("too many evaluations for a single session: {len}")]
    TooManyEvaluations { len: usize },

    #[error("total questions ({total}) does not match correct plus mistake counts ({sum})")]
    CountMismatch { total: u32, sum: u32 },
}

/// Archived record of a completed worksheet session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    session_id: SessionId,
    student: StudentId,
    topic: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_questions: u32,
    correct: u32,
    mistakes: BTreeMap<MistakeType, u32>,
    percentage: f64,
}

impl SessionSummary {
    /// Rehydrate a session summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if the times are reversed.
    /// Returns `SessionSummaryError::CountMismatch` if totals do not align.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        session_id: SessionId,
        student: StudentId,
        topic: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        total_questions: u32,
        correct: u32,
        mistakes: BTreeMap<MistakeType, u32>,
        percentage: f64,
    ) -> Result<Self, SessionSummaryError> {
        if completed_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        let sum = mistakes
            .iter()
            .filter(|(kind, _)| **kind != MistakeType::Correct)
            .fold(correct, |acc, (_, count)| acc.saturating_add(*count));
        if sum != total_questions {
            return Err(SessionSummaryError::CountMismatch {
                total: total_questions,
                sum,
            });
        }

        Ok(Self {
            session_id,
            student,
            topic: topic.into(),
            started_at,
            completed_at,
            total_questions,
            correct,
            mistakes: mistakes
                .into_iter()
                .filter(|(kind, count)| *kind != MistakeType::Correct && *count > 0)
                .collect(),
            percentage,
        })
    }

    /// Build a summary from the session's evaluations.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidTimeRange` if `completed_at` is before `started_at`.
    /// Returns `SessionSummaryError::TooManyEvaluations` if the count cannot fit in `u32`.
    pub fn from_evaluations(
        session_id: SessionId,
        student: StudentId,
        topic: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        evaluations: &[Evaluation],
    ) -> Result<Self, SessionSummaryError> {
        let total_questions = u32::try_from(evaluations.len()).map_err(|_| {
            SessionSummaryError::TooManyEvaluations {
                len: evaluations.len(),
            }
        })?;

        let mut correct = 0_u32;
        let mut mistakes: BTreeMap<MistakeType, u32> = BTreeMap::new();
        for evaluation in evaluations {
            if evaluation.correct {
                correct = correct.saturating_add(1);
            } else {
                let count = mistakes.entry(evaluation.mistake).or_insert(0);
                *count = count.saturating_add(1);
            }
        }

        let percentage = EvaluationSummary::from_evaluations(evaluations).percentage;

        Self::from_persisted(
            session_id,
            student,
            topic,
            started_at,
            completed_at,
            total_questions,
            correct,
            mistakes,
            percentage,
        )
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn student(&self) -> &StudentId {
        &self.student
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    /// Mistake counts for incorrect answers only.
    #[must_use]
    pub fn mistakes(&self) -> &BTreeMap<MistakeType, u32> {
        &self.mistakes
    }

    #[must_use]
    pub fn percentage(&self) -> f64 {
        self.percentage
    }
}
