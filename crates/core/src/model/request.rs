use serde::{Deserialize, Serialize};

use crate::error::{SchemaViolation, require_text};
use crate::model::ids::StudentId;

/// Difficulty the student asked for when requesting a worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyPreference {
    Easy,
    Medium,
    Hard,
    #[default]
    Mixed,
}

impl DifficultyPreference {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// Initial input of the pipeline: who is studying what, and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRequest {
    pub student: StudentId,
    pub grade: String,
    pub subject: String,
    pub topic: String,
    pub time_minutes: u32,
    #[serde(default)]
    pub difficulty: DifficultyPreference,
}

impl StudyRequest {
    /// # Errors
    ///
    /// Returns `SchemaViolation` for blank text fields or a zero time budget.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        require_text("grade", &self.grade)?;
        require_text("subject", &self.subject)?;
        require_text("topic", &self.topic)?;
        if self.time_minutes == 0 {
            return Err(SchemaViolation::new("time_minutes", "a positive number of minutes"));
        }
        Ok(())
    }
}
