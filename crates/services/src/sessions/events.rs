use study_core::model::{QuestionId, SessionId};

use super::session::SessionState;
use crate::worksheet_loop::RejectReason;

/// Notifications published by the driver for presenters and observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        session_id: SessionId,
        from: SessionState,
        to: SessionState,
    },
    QuestionPresented {
        session_id: SessionId,
        index: usize,
        question_id: QuestionId,
    },
    AnswerRecorded {
        session_id: SessionId,
        question_id: QuestionId,
        answered: usize,
        total: usize,
    },
    AnswerRejected {
        session_id: SessionId,
        question_id: QuestionId,
        reason: RejectReason,
    },
}

impl SessionEvent {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::QuestionPresented { session_id, .. }
            | SessionEvent::AnswerRecorded { session_id, .. }
            | SessionEvent::AnswerRejected { session_id, .. } => *session_id,
        }
    }
}
