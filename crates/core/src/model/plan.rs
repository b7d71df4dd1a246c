use serde::{Deserialize, Serialize};

use crate::error::SchemaViolation;

/// How many questions of each difficulty the worksheet should contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DifficultyMix {
    #[serde(default)]
    pub easy: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub hard: u32,
}

impl DifficultyMix {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.easy
            .saturating_add(self.medium)
            .saturating_add(self.hard)
    }
}

/// Planner output: the shape of the worksheet, not its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetPlan {
    pub total_questions: u32,
    pub multiple_choice: u32,
    pub short_answer: u32,
    pub difficulty: DifficultyMix,
    pub estimated_minutes: u32,
}

impl WorksheetPlan {
    /// # Errors
    ///
    /// Returns `SchemaViolation` when the counts do not add up.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if self.total_questions == 0 {
            return Err(SchemaViolation::new("total_questions", "at least one question"));
        }
        if self.multiple_choice.saturating_add(self.short_answer) != self.total_questions {
            return Err(SchemaViolation::new(
                "multiple_choice",
                format!(
                    "multiple_choice + short_answer == {}",
                    self.total_questions
                ),
            ));
        }
        if self.difficulty.total() != self.total_questions {
            return Err(SchemaViolation::new(
                "difficulty",
                format!("difficulty counts summing to {}", self.total_questions),
            ));
        }
        Ok(())
    }
}
