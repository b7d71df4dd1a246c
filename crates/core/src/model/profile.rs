use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::SchemaViolation;
use crate::model::evaluation::{Evaluation, EvaluationSummary};
use crate::model::ids::{QuestionId, SessionId, StudentId};
use crate::model::question::Question;
use crate::model::skill::{FOCUS_ACCURACY, SessionTally, SkillRecord, SkillSnapshot};
use crate::model::tag::SkillTag;

//
// ─── PROGRESS BATCH ────────────────────────────────────────────────────────────
//

/// One graded answer, reduced to what the progress profile needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillOutcome {
    pub question_id: QuestionId,
    pub skill: SkillTag,
    pub correct: bool,
}

/// Everything a single session contributes to a student's profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressBatch {
    pub session_id: SessionId,
    pub topic: String,
    pub recorded_at: DateTime<Utc>,
    pub percentage: f64,
    pub outcomes: Vec<SkillOutcome>,
}

impl ProgressBatch {
    /// Join evaluations with their questions to recover the skill tags.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` if an evaluation references an unknown question.
    pub fn from_evaluations(
        session_id: SessionId,
        topic: impl Into<String>,
        questions: &[Question],
        evaluations: &[Evaluation],
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, SchemaViolation> {
        let skills: HashMap<QuestionId, &SkillTag> =
            questions.iter().map(|q| (q.id, &q.skill)).collect();

        let outcomes = evaluations
            .iter()
            .enumerate()
            .map(|(index, evaluation)| {
                let skill = skills.get(&evaluation.question_id).ok_or_else(|| {
                    SchemaViolation::new(
                        format!("evaluations[{index}].question_id"),
                        "the id of a question in this session",
                    )
                })?;
                Ok(SkillOutcome {
                    question_id: evaluation.question_id,
                    skill: (*skill).clone(),
                    correct: evaluation.correct,
                })
            })
            .collect::<Result<Vec<_>, SchemaViolation>>()?;

        Ok(Self {
            session_id,
            topic: topic.into(),
            recorded_at,
            percentage: EvaluationSummary::from_evaluations(evaluations).percentage,
            outcomes,
        })
    }

    /// Distinct skills touched by this batch, in tag order.
    #[must_use]
    pub fn skills(&self) -> BTreeSet<&SkillTag> {
        self.outcomes.iter().map(|o| &o.skill).collect()
    }
}

//
// ─── STUDENT PROFILE ───────────────────────────────────────────────────────────
//

/// Long-term memory for one student: skill records plus session bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    student: StudentId,
    skills: BTreeMap<SkillTag, SkillRecord>,
    total_sessions: u32,
    last_topic: Option<String>,
    last_percentage: Option<f64>,
    applied_sessions: BTreeSet<SessionId>,
}

impl StudentProfile {
    /// Profile of a student with no history.
    #[must_use]
    pub fn empty(student: StudentId) -> Self {
        Self {
            student,
            skills: BTreeMap::new(),
            total_sessions: 0,
            last_topic: None,
            last_percentage: None,
            applied_sessions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn student(&self) -> &StudentId {
        &self.student
    }

    #[must_use]
    pub fn skills(&self) -> &BTreeMap<SkillTag, SkillRecord> {
        &self.skills
    }

    #[must_use]
    pub fn skill(&self, tag: &SkillTag) -> Option<&SkillRecord> {
        self.skills.get(tag)
    }

    #[must_use]
    pub fn total_sessions(&self) -> u32 {
        self.total_sessions
    }

    #[must_use]
    pub fn last_topic(&self) -> Option<&str> {
        self.last_topic.as_deref()
    }

    #[must_use]
    pub fn last_percentage(&self) -> Option<f64> {
        self.last_percentage
    }

    #[must_use]
    pub fn has_applied(&self, session_id: SessionId) -> bool {
        self.applied_sessions.contains(&session_id)
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<SkillSnapshot> {
        self.skills.values().map(SkillRecord::snapshot).collect()
    }

    /// Weakest practiced skills first, limited to those below `FOCUS_ACCURACY`.
    #[must_use]
    pub fn focus_skills(&self, limit: usize) -> Vec<SkillTag> {
        let mut weak: Vec<&SkillRecord> = self
            .skills
            .values()
            .filter(|r| r.attempts() > 0 && r.accuracy() < FOCUS_ACCURACY)
            .collect();
        weak.sort_by(|a, b| a.accuracy().total_cmp(&b.accuracy()));
        weak.into_iter()
            .take(limit)
            .map(|r| r.skill().clone())
            .collect()
    }

    /// Fold a session into the profile and return the touched skill records.
    ///
    /// Applying a batch whose session was already applied changes nothing; the
    /// current records for the batch's skills are returned instead.
    pub fn apply(&mut self, batch: &ProgressBatch) -> Vec<SkillRecord> {
        if self.has_applied(batch.session_id) {
            return self.records_for(batch);
        }

        let mut tallies: BTreeMap<&SkillTag, SessionTally> = BTreeMap::new();
        for outcome in &batch.outcomes {
            tallies
                .entry(&outcome.skill)
                .or_default()
                .record(outcome.correct);
        }

        for (skill, tally) in tallies {
            self.skills
                .entry(skill.clone())
                .or_insert_with(|| SkillRecord::new(skill.clone(), batch.recorded_at))
                .record_session(tally, batch.recorded_at);
        }

        self.total_sessions = self.total_sessions.saturating_add(1);
        self.last_topic = Some(batch.topic.clone());
        self.last_percentage = Some(batch.percentage);
        self.applied_sessions.insert(batch.session_id);

        self.records_for(batch)
    }

    fn records_for(&self, batch: &ProgressBatch) -> Vec<SkillRecord> {
        batch
            .skills()
            .into_iter()
            .filter_map(|skill| self.skills.get(skill).cloned())
            .collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
