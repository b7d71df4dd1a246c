//! Agent capability interface: one `produce` contract for every pipeline role.

mod backend;
mod json_agent;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use study_core::SchemaViolation;
use study_core::model::{
    Answer, Audience, DifficultyPreference, Evaluation, Explanation, Question, ReportFacts,
    ReportNarrative, SkillSnapshot, SkillTag, StudentProfile, StudyRequest, WorksheetPlan,
};

use crate::error::AgentFailure;

pub use backend::{ChatCompletionsBackend, ReasoningBackend};
pub use json_agent::JsonAgent;

/// Number of weak skills handed to the planner.
const FOCUS_SKILL_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    QuestionGenerator,
    Evaluator,
    Explanation,
    Report,
}

impl AgentRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::QuestionGenerator => "question_generator",
            AgentRole::Evaluator => "evaluator",
            AgentRole::Explanation => "explanation",
            AgentRole::Report => "report",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── STAGE INPUTS ──────────────────────────────────────────────────────────────
//

/// Planner view: the request plus what the profile says about the student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub grade: String,
    pub subject: String,
    pub topic: String,
    pub time_minutes: u32,
    pub difficulty: DifficultyPreference,
    pub skills: Vec<SkillSnapshot>,
    pub focus_skills: Vec<SkillTag>,
    pub last_percentage: Option<f64>,
}

impl PlanRequest {
    #[must_use]
    pub fn new(request: &StudyRequest, profile: &StudentProfile) -> Self {
        Self {
            grade: request.grade.clone(),
            subject: request.subject.clone(),
            topic: request.topic.clone(),
            time_minutes: request.time_minutes,
            difficulty: request.difficulty,
            skills: profile.snapshots(),
            focus_skills: profile.focus_skills(FOCUS_SKILL_LIMIT),
            last_percentage: profile.last_percentage(),
        }
    }
}

/// Generator view: the request plus the validated plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub grade: String,
    pub subject: String,
    pub topic: String,
    pub plan: WorksheetPlan,
    pub focus_skills: Vec<SkillTag>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(request: &StudyRequest, plan: WorksheetPlan, profile: Option<&StudentProfile>) -> Self {
        Self {
            grade: request.grade.clone(),
            subject: request.subject.clone(),
            topic: request.topic.clone(),
            plan,
            focus_skills: profile
                .map(|p| p.focus_skills(FOCUS_SKILL_LIMIT))
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRequest {
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationRequest {
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRequest {
    pub audience: Audience,
    pub grade: String,
    pub subject: String,
    pub topic: String,
    pub facts: ReportFacts,
}

/// Owned per-stage view handed to an agent. Agents never see the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageInput {
    Plan(PlanRequest),
    Generate(GenerationRequest),
    Evaluate(EvaluationRequest),
    Explain(ExplanationRequest),
    Report(ReportRequest),
}

impl StageInput {
    #[must_use]
    pub fn role(&self) -> AgentRole {
        match self {
            StageInput::Plan(_) => AgentRole::Planner,
            StageInput::Generate(_) => AgentRole::QuestionGenerator,
            StageInput::Evaluate(_) => AgentRole::Evaluator,
            StageInput::Explain(_) => AgentRole::Explanation,
            StageInput::Report(_) => AgentRole::Report,
        }
    }
}

//
// ─── STAGE OUTPUTS ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Plan(WorksheetPlan),
    Questions(Vec<Question>),
    Evaluations(Vec<Evaluation>),
    Explanations(Vec<Explanation>),
    Report(ReportNarrative),
}

impl StageOutput {
    #[must_use]
    pub fn role(&self) -> AgentRole {
        match self {
            StageOutput::Plan(_) => AgentRole::Planner,
            StageOutput::Questions(_) => AgentRole::QuestionGenerator,
            StageOutput::Evaluations(_) => AgentRole::Evaluator,
            StageOutput::Explanations(_) => AgentRole::Explanation,
            StageOutput::Report(_) => AgentRole::Report,
        }
    }

    fn mismatch(&self, expected: AgentRole) -> SchemaViolation {
        SchemaViolation::new(
            "output",
            format!("{expected} output, got {} output", self.role()),
        )
    }

    /// # Errors
    ///
    /// Returns `SchemaViolation` if the output belongs to another role.
    pub fn into_plan(self) -> Result<WorksheetPlan, SchemaViolation> {
        match self {
            StageOutput::Plan(plan) => Ok(plan),
            other => Err(other.mismatch(AgentRole::Planner)),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaViolation` if the output belongs to another role.
    pub fn into_questions(self) -> Result<Vec<Question>, SchemaViolation> {
        match self {
            StageOutput::Questions(questions) => Ok(questions),
            other => Err(other.mismatch(AgentRole::QuestionGenerator)),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaViolation` if the output belongs to another role.
    pub fn into_evaluations(self) -> Result<Vec<Evaluation>, SchemaViolation> {
        match self {
            StageOutput::Evaluations(evaluations) => Ok(evaluations),
            other => Err(other.mismatch(AgentRole::Evaluator)),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaViolation` if the output belongs to another role.
    pub fn into_explanations(self) -> Result<Vec<Explanation>, SchemaViolation> {
        match self {
            StageOutput::Explanations(explanations) => Ok(explanations),
            other => Err(other.mismatch(AgentRole::Explanation)),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaViolation` if the output belongs to another role.
    pub fn into_report(self) -> Result<ReportNarrative, SchemaViolation> {
        match self {
            StageOutput::Report(narrative) => Ok(narrative),
            other => Err(other.mismatch(AgentRole::Report)),
        }
    }
}

//
// ─── CAPABILITY ────────────────────────────────────────────────────────────────
//

/// A reasoning stage. The driver only ever talks to agents through this trait.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce the output for one stage input.
    ///
    /// # Errors
    ///
    /// Returns `AgentFailure` when no usable output could be produced.
    async fn produce(&self, input: &StageInput) -> Result<StageOutput, AgentFailure>;
}

/// The agents injected into the driver, one per role.
#[derive(Clone)]
pub struct AgentSet {
    pub planner: Arc<dyn Agent>,
    pub generator: Arc<dyn Agent>,
    pub evaluator: Arc<dyn Agent>,
    pub explainer: Arc<dyn Agent>,
    pub reporter: Arc<dyn Agent>,
}

impl AgentSet {
    /// Use one agent for every role.
    #[must_use]
    pub fn uniform(agent: Arc<dyn Agent>) -> Self {
        Self {
            planner: Arc::clone(&agent),
            generator: Arc::clone(&agent),
            evaluator: Arc::clone(&agent),
            explainer: Arc::clone(&agent),
            reporter: agent,
        }
    }

    #[must_use]
    pub fn for_role(&self, role: AgentRole) -> &Arc<dyn Agent> {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::QuestionGenerator => &self.generator,
            AgentRole::Evaluator => &self.evaluator,
            AgentRole::Explanation => &self.explainer,
            AgentRole::Report => &self.reporter,
        }
    }
}
