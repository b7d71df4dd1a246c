use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use study_core::model::{Answer, Question, QuestionId};

use crate::error::StateViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    Cancelled,
    TimedOut,
}

/// Answered and remaining counts, for presenters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorksheetProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

impl WorksheetProgress {
    pub(crate) fn counted(total: usize, answered: usize) -> Self {
        Self {
            total,
            answered,
            remaining: total.saturating_sub(answered),
            is_complete: total > 0 && answered == total,
        }
    }
}

/// Where the worksheet stands. Indexes are 0-based question positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Presenting(usize),
    AwaitingAnswer(usize),
    Complete,
    Abandoned(AbandonReason),
}

impl LoopState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Complete | LoopState::Abandoned(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Blank or whitespace-only response.
    Empty,
    /// Multiple-choice response that names no option.
    UnknownOption,
}

/// Result of a submission made while a question was awaiting its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Answer recorded. `next` is the index of the next question, if any.
    Accepted {
        question_id: QuestionId,
        next: Option<usize>,
    },
    /// Nothing recorded; the same question is still awaiting an answer.
    Rejected(RejectReason),
    /// The answer window had closed; the worksheet is abandoned.
    Expired,
}

/// Presents questions one at a time in generation order and collects one answer
/// per question.
#[derive(Debug, Clone)]
pub struct WorksheetLoop {
    questions: Vec<Question>,
    answers: Vec<Answer>,
    state: LoopState,
    timeout: Option<Duration>,
    presented_at: Option<DateTime<Utc>>,
}

impl WorksheetLoop {
    #[must_use]
    pub fn new(questions: Vec<Question>, timeout: Option<Duration>) -> Self {
        let state = if questions.is_empty() {
            LoopState::Complete
        } else {
            LoopState::Presenting(0)
        };
        Self {
            questions,
            answers: Vec::new(),
            state,
            timeout,
            presented_at: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == LoopState::Complete
    }

    /// When the question currently awaiting an answer stops accepting one.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            LoopState::AwaitingAnswer(_) => Some(self.presented_at? + self.timeout?),
            _ => None,
        }
    }

    #[must_use]
    pub fn progress(&self) -> WorksheetProgress {
        WorksheetProgress {
            is_complete: self.is_complete(),
            ..WorksheetProgress::counted(self.questions.len(), self.answers.len())
        }
    }

    /// Show the current question and start its answer window.
    ///
    /// Presenting again while the question is awaiting its answer returns the same
    /// question and keeps the original deadline.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation::LoopClosed` once the worksheet is complete or abandoned.
    pub fn present(&mut self, now: DateTime<Utc>) -> Result<&Question, StateViolation> {
        let index = match self.state {
            LoopState::Presenting(index) => {
                self.state = LoopState::AwaitingAnswer(index);
                self.presented_at = Some(now);
                index
            }
            LoopState::AwaitingAnswer(index) => index,
            LoopState::Complete | LoopState::Abandoned(_) => {
                return Err(StateViolation::LoopClosed);
            }
        };
        self.questions.get(index).ok_or(StateViolation::LoopClosed)
    }

    /// Record the student's response to the question awaiting an answer.
    ///
    /// The raw response is stored unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation` unless a question is awaiting its answer.
    pub fn submit(&mut self, raw: &str, now: DateTime<Utc>) -> Result<SubmitOutcome, StateViolation> {
        let index = match self.state {
            LoopState::AwaitingAnswer(index) => index,
            LoopState::Presenting(_) => return Err(StateViolation::NotAwaitingAnswer),
            LoopState::Complete | LoopState::Abandoned(_) => {
                return Err(StateViolation::LoopClosed);
            }
        };

        if self.expire(now) {
            return Ok(SubmitOutcome::Expired);
        }

        let question = self
            .questions
            .get(index)
            .ok_or(StateViolation::LoopClosed)?;
        if raw.trim().is_empty() {
            return Ok(SubmitOutcome::Rejected(RejectReason::Empty));
        }
        if question.is_multiple_choice() && question.resolve_choice(raw).is_none() {
            return Ok(SubmitOutcome::Rejected(RejectReason::UnknownOption));
        }

        let question_id = question.id;
        self.answers.push(Answer::new(question_id, raw, now));
        self.presented_at = None;

        let next = index + 1;
        if next < self.questions.len() {
            self.state = LoopState::Presenting(next);
            Ok(SubmitOutcome::Accepted {
                question_id,
                next: Some(next),
            })
        } else {
            self.state = LoopState::Complete;
            Ok(SubmitOutcome::Accepted {
                question_id,
                next: None,
            })
        }
    }

    /// Abandon the worksheet if the current answer window has passed. Returns whether
    /// it did.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline() {
            Some(deadline) if now > deadline => {
                self.state = LoopState::Abandoned(AbandonReason::TimedOut);
                true
            }
            _ => false,
        }
    }

    /// # Errors
    ///
    /// Returns `StateViolation::LoopClosed` if the worksheet already finished.
    pub fn abandon(&mut self, reason: AbandonReason) -> Result<(), StateViolation> {
        if self.state.is_terminal() {
            return Err(StateViolation::LoopClosed);
        }
        self.state = LoopState::Abandoned(reason);
        Ok(())
    }

    /// Hand over the answers once the loop is done with them.
    #[must_use]
    pub fn into_answers(self) -> Vec<Answer> {
        self.answers
    }
}
