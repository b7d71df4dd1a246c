use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use study_core::model::{
    Answer, Evaluation, Explanation, ProgressBatch, Question, Report, SessionId, SessionSummary,
    SkillRecord, StudentId, StudentProfile, StudyRequest, WorksheetPlan,
};

use crate::worksheet_loop::{WorksheetLoop, WorksheetProgress};

//
// ─── STATES ────────────────────────────────────────────────────────────────────
//

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Generating,
    Administering,
    Evaluating,
    Explaining,
    UpdatingProgress,
    Reporting,
}

impl Stage {
    /// The stage that follows this one, `None` after reporting.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Planning => Some(Stage::Generating),
            Stage::Generating => Some(Stage::Administering),
            Stage::Administering => Some(Stage::Evaluating),
            Stage::Evaluating => Some(Stage::Explaining),
            Stage::Explaining => Some(Stage::UpdatingProgress),
            Stage::UpdatingProgress => Some(Stage::Reporting),
            Stage::Reporting => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Generating => "generating",
            Stage::Administering => "administering",
            Stage::Evaluating => "evaluating",
            Stage::Explaining => "explaining",
            Stage::UpdatingProgress => "updating_progress",
            Stage::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum SessionState {
    Running(Stage),
    Done,
    Errored(Stage),
    Abandoned,
}

impl SessionState {
    /// `Done` and `Abandoned` never change again. `Errored` can be resumed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Abandoned)
    }

    #[must_use]
    pub fn stage(self) -> Option<Stage> {
        match self {
            SessionState::Running(stage) | SessionState::Errored(stage) => Some(stage),
            SessionState::Done | SessionState::Abandoned => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Running(stage) => write!(f, "running({stage})"),
            SessionState::Done => f.write_str("done"),
            SessionState::Errored(stage) => write!(f, "errored({stage})"),
            SessionState::Abandoned => f.write_str("abandoned"),
        }
    }
}

//
// ─── FAILURE REPORT ────────────────────────────────────────────────────────────
//

/// Work an errored session still holds and will reuse on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Plan,
    Questions,
    Answers,
    Evaluations,
    Explanations,
}

impl Artifact {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Artifact::Plan => "plan",
            Artifact::Questions => "questions",
            Artifact::Answers => "answers",
            Artifact::Evaluations => "evaluations",
            Artifact::Explanations => "explanations",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub stage: Stage,
    pub cause: String,
    pub salvaged: Vec<Artifact>,
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.cause)?;
        if self.salvaged.is_empty() {
            return f.write_str(" (nothing salvaged)");
        }
        let salvaged: Vec<&str> = self.salvaged.iter().map(|a| a.as_str()).collect();
        write!(f, " (salvaged: {})", salvaged.join(", "))
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub summary: SessionSummary,
    pub evaluations: Vec<Evaluation>,
    pub explanations: Vec<Explanation>,
    pub updated_skills: Vec<SkillRecord>,
    pub reports: Vec<Report>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One student's attempt at one generated worksheet.
///
/// Held by the caller and mutated only through the pipeline driver.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    request: StudyRequest,
    state: SessionState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    profile: Option<StudentProfile>,
    plan: Option<WorksheetPlan>,
    questions: Vec<Question>,
    worksheet: Option<WorksheetLoop>,
    answers: Vec<Answer>,
    evaluations: Vec<Evaluation>,
    explanations: Vec<Explanation>,
    staged_progress: Option<ProgressBatch>,
    updated_skills: Option<Vec<SkillRecord>>,
    summary: Option<SessionSummary>,
    reports: Vec<Report>,
    failure: Option<FailureReport>,
}

impl Session {
    pub(crate) fn new(id: SessionId, request: StudyRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            state: SessionState::Running(Stage::Planning),
            created_at: now,
            updated_at: now,
            profile: None,
            plan: None,
            questions: Vec::new(),
            worksheet: None,
            answers: Vec::new(),
            evaluations: Vec::new(),
            explanations: Vec::new(),
            staged_progress: None,
            updated_skills: None,
            summary: None,
            reports: Vec::new(),
            failure: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn student(&self) -> &StudentId {
        &self.request.student
    }

    #[must_use]
    pub fn request(&self) -> &StudyRequest {
        &self.request
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Profile read at planning time, before this session's update.
    #[must_use]
    pub fn profile(&self) -> Option<&StudentProfile> {
        self.profile.as_ref()
    }

    #[must_use]
    pub fn plan(&self) -> Option<&WorksheetPlan> {
        self.plan.as_ref()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn worksheet(&self) -> Option<&WorksheetLoop> {
        self.worksheet.as_ref()
    }

    /// Answers recorded so far, whether still in the worksheet or handed over.
    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        match &self.worksheet {
            Some(worksheet) => worksheet.answers(),
            None => &self.answers,
        }
    }

    #[must_use]
    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    #[must_use]
    pub fn explanations(&self) -> &[Explanation] {
        &self.explanations
    }

    /// Progress prepared for this session. Written to the store only once every report
    /// has been produced.
    #[must_use]
    pub fn staged_progress(&self) -> Option<&ProgressBatch> {
        self.staged_progress.as_ref()
    }

    /// Skill records with this session folded in. A preview until the session is done.
    #[must_use]
    pub fn updated_skills(&self) -> Option<&[SkillRecord]> {
        self.updated_skills.as_deref()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Why the session errored. Kept after a resume until the next failure.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureReport> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn progress(&self) -> WorksheetProgress {
        match &self.worksheet {
            Some(worksheet) => worksheet.progress(),
            None => WorksheetProgress::counted(self.questions.len(), self.answers.len()),
        }
    }

    /// Artifacts currently held, in pipeline order.
    #[must_use]
    pub fn salvaged(&self) -> Vec<Artifact> {
        let mut salvaged = Vec::new();
        if self.plan.is_some() {
            salvaged.push(Artifact::Plan);
        }
        if !self.questions.is_empty() {
            salvaged.push(Artifact::Questions);
        }
        if !self.answers().is_empty() {
            salvaged.push(Artifact::Answers);
        }
        if !self.evaluations.is_empty() {
            salvaged.push(Artifact::Evaluations);
        }
        if !self.explanations.is_empty() {
            salvaged.push(Artifact::Explanations);
        }
        salvaged
    }

    /// Outcome of a finished session.
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        if self.state != SessionState::Done {
            return None;
        }
        Some(SessionOutcome {
            session_id: self.id,
            summary: self.summary.clone()?,
            evaluations: self.evaluations.clone(),
            explanations: self.explanations.clone(),
            updated_skills: self.updated_skills.clone().unwrap_or_default(),
            reports: self.reports.clone(),
        })
    }

    //
    // ─── DRIVER MUTATIONS ──────────────────────────────────────────────────────
    //

    pub(crate) fn set_state(&mut self, state: SessionState, now: DateTime<Utc>) {
        self.state = state;
        self.updated_at = now;
    }

    pub(crate) fn fail(&mut self, stage: Stage, cause: String, now: DateTime<Utc>) {
        self.failure = Some(FailureReport {
            stage,
            cause,
            salvaged: self.salvaged(),
        });
        self.set_state(SessionState::Errored(stage), now);
    }

    pub(crate) fn set_plan(&mut self, profile: StudentProfile, plan: WorksheetPlan) {
        self.profile = Some(profile);
        self.plan = Some(plan);
    }

    pub(crate) fn set_questions(&mut self, questions: Vec<Question>, worksheet: WorksheetLoop) {
        self.questions = questions;
        self.worksheet = Some(worksheet);
    }

    pub(crate) fn worksheet_mut(&mut self) -> Option<&mut WorksheetLoop> {
        self.worksheet.as_mut()
    }

    /// Move the answers out of a finished worksheet.
    pub(crate) fn close_worksheet(&mut self) {
        if let Some(worksheet) = self.worksheet.take() {
            self.answers = worksheet.into_answers();
        }
    }

    pub(crate) fn set_evaluations(&mut self, evaluations: Vec<Evaluation>) {
        self.evaluations = evaluations;
    }

    pub(crate) fn set_explanations(&mut self, explanations: Vec<Explanation>) {
        self.explanations = explanations;
    }

    pub(crate) fn stage_progress(&mut self, batch: ProgressBatch, preview: Vec<SkillRecord>) {
        self.staged_progress = Some(batch);
        self.updated_skills = Some(preview);
    }

    pub(crate) fn set_reports(
        &mut self,
        summary: SessionSummary,
        reports: Vec<Report>,
        committed: Vec<SkillRecord>,
    ) {
        self.summary = Some(summary);
        self.reports = reports;
        self.updated_skills = Some(committed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_run_in_fixed_order() {
        let mut stage = Stage::Planning;
        let mut order = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            order.push(next);
            stage = next;
        }
        assert_eq!(order.len(), 7);
        assert_eq!(order.last(), Some(&Stage::Reporting));
    }

    #[test]
    fn failure_report_names_stage_and_salvaged_work() {
        let report = FailureReport {
            stage: Stage::Evaluating,
            cause: "backend down".into(),
            salvaged: vec![Artifact::Plan, Artifact::Questions, Artifact::Answers],
        };
        assert_eq!(
            report.to_string(),
            "evaluating failed: backend down (salvaged: plan, questions, answers)"
        );

        let empty = FailureReport {
            salvaged: Vec::new(),
            ..report
        };
        assert_eq!(
            empty.to_string(),
            "evaluating failed: backend down (nothing salvaged)"
        );
    }

    #[test]
    fn errored_is_not_terminal() {
        assert!(SessionState::Done.is_terminal());
        assert!(SessionState::Abandoned.is_terminal());
        assert!(!SessionState::Errored(Stage::Evaluating).is_terminal());
        assert_eq!(
            SessionState::Errored(Stage::Evaluating).to_string(),
            "errored(evaluating)"
        );
    }
}
