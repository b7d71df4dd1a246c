use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::QuestionId;

/// A student's response to one question, recorded exactly as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub response: String,
    pub submitted_at: DateTime<Utc>,
}

impl Answer {
    #[must_use]
    pub fn new(question_id: QuestionId, response: impl Into<String>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            question_id,
            response: response.into(),
            submitted_at,
        }
    }
}
