use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SchemaViolation, require_text};
use crate::model::evaluation::Evaluation;
use crate::model::ids::SessionId;
use crate::model::skill::{FOCUS_ACCURACY, STRENGTH_ACCURACY, SkillRecord, SkillSnapshot};
use crate::model::summary::SessionSummary;
use crate::model::tag::SkillTag;

const MAX_BULLET_POINTS: usize = 6;
const MAX_RECOMMENDED_TOPICS: usize = 5;

/// Who a report rendering is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Student,
    Parent,
    Teacher,
}

impl Audience {
    pub const ALL: [Audience; 3] = [Audience::Student, Audience::Parent, Audience::Teacher];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Student => "student",
            Audience::Parent => "parent",
            Audience::Teacher => "teacher",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience-specific wording produced by the report agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportNarrative {
    pub audience: Audience,
    pub headline: String,
    pub strengths: String,
    pub weaknesses: String,
    pub next_steps: String,
    pub bullet_points: Vec<String>,
    #[serde(default)]
    pub recommended_topics: Vec<String>,
    /// Encouragement addressed to the student. Required for the student rendering.
    #[serde(default)]
    pub motivational_message: Option<String>,
}

impl ReportNarrative {
    /// # Errors
    ///
    /// Returns `SchemaViolation` if the rendering names another audience, has blank
    /// text, carries no bullet points or more than six, recommends more than five
    /// topics, or is a student rendering without a motivational message.
    pub fn validate(&self, requested: Audience) -> Result<(), SchemaViolation> {
        if self.audience != requested {
            return Err(SchemaViolation::new(
                "audience",
                format!("the requested audience `{requested}`"),
            ));
        }
        require_text("headline", &self.headline)?;
        require_text("strengths", &self.strengths)?;
        require_text("weaknesses", &self.weaknesses)?;
        require_text("next_steps", &self.next_steps)?;
        if self.bullet_points.is_empty() || self.bullet_points.len() > MAX_BULLET_POINTS {
            return Err(SchemaViolation::new(
                "bullet_points",
                format!("between 1 and {MAX_BULLET_POINTS} items"),
            ));
        }
        for (index, point) in self.bullet_points.iter().enumerate() {
            require_text(&format!("bullet_points[{index}]"), point)?;
        }
        if self.recommended_topics.len() > MAX_RECOMMENDED_TOPICS {
            return Err(SchemaViolation::new(
                "recommended_topics",
                format!("at most {MAX_RECOMMENDED_TOPICS} items"),
            ));
        }
        for (index, topic) in self.recommended_topics.iter().enumerate() {
            require_text(&format!("recommended_topics[{index}]"), topic)?;
        }
        match (&self.motivational_message, requested) {
            (Some(message), _) => require_text("motivational_message", message)?,
            (None, Audience::Student) => {
                return Err(SchemaViolation::new(
                    "motivational_message",
                    "an encouraging message for the student",
                ));
            }
            (None, Audience::Parent | Audience::Teacher) => {}
        }
        Ok(())
    }
}

/// Audience-independent facts shared by every rendering of one session's report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportFacts {
    pub session_id: SessionId,
    pub summary: SessionSummary,
    pub evaluations: Vec<Evaluation>,
    pub skills: Vec<SkillSnapshot>,
    pub strengths: Vec<SkillTag>,
    pub focus_areas: Vec<SkillTag>,
}

impl ReportFacts {
    /// Compose facts from the session summary, its evaluations and the skill records
    /// this session just updated.
    #[must_use]
    pub fn compose(
        summary: SessionSummary,
        evaluations: Vec<Evaluation>,
        updated: &[SkillRecord],
    ) -> Self {
        let skills: Vec<SkillSnapshot> = updated.iter().map(SkillRecord::snapshot).collect();
        let strengths = skills
            .iter()
            .filter(|s| s.attempts > 0 && s.accuracy >= STRENGTH_ACCURACY)
            .map(|s| s.skill.clone())
            .collect();
        let focus_areas = skills
            .iter()
            .filter(|s| s.attempts > 0 && s.accuracy < FOCUS_ACCURACY)
            .map(|s| s.skill.clone())
            .collect();

        Self {
            session_id: summary.session_id(),
            summary,
            evaluations,
            skills,
            strengths,
            focus_areas,
        }
    }
}

/// One rendering plus the facts it was written from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub narrative: ReportNarrative,
    pub facts: ReportFacts,
}

impl Report {
    #[must_use]
    pub fn audience(&self) -> Audience {
        self.narrative.audience
    }
}
