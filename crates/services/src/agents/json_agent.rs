use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use study_core::model::{Evaluation, Explanation, Question, ReportNarrative, WorksheetPlan};

use super::backend::ReasoningBackend;
use super::{Agent, AgentRole, StageInput, StageOutput};
use crate::error::AgentFailure;

/// Agent that renders the stage input as JSON, sends it to a reasoning backend and
/// decodes the JSON object in the reply.
///
/// Replies wrapped in code fences or surrounded by prose are tolerated. Anything that
/// does not decode into the stage's output shape is an `AgentFailure`, so the driver
/// will retry it.
pub struct JsonAgent<B> {
    backend: B,
}

impl<B: ReasoningBackend> JsonAgent<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn prompt(input: &StageInput) -> Result<String, AgentFailure> {
        let payload = serde_json::to_string_pretty(input)
            .map_err(|e| AgentFailure::new(input.role(), format!("cannot encode input: {e}")))?;
        Ok(format!(
            "{}\n\nReturn ONLY a JSON object of this shape:\n{}\n\nInput:\n{payload}",
            instruction(input.role()),
            output_shape(input.role()),
        ))
    }
}

fn instruction(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => {
            "Plan a worksheet that fits the time budget. Weight question counts toward the \
             focus skills and pick a difficulty mix from the preference and past accuracy."
        }
        AgentRole::QuestionGenerator => {
            "Write the worksheet questions exactly as planned. Number ids from 1, tag each \
             question with the skill it exercises, and give multiple-choice questions \
             exactly one correct option."
        }
        AgentRole::Evaluator => {
            "Grade each answer against its question, in question order. Use mistake \
             `correct` only for correct answers and give partial credit in `score`."
        }
        AgentRole::Explanation => {
            "For every question, in order, write a short hint and a step-by-step \
             explanation aimed at the mistake that was made."
        }
        AgentRole::Report => {
            "Write a session report for the requested audience from the facts given. \
             Do not invent numbers that are not in the facts. Suggest up to five topics to \
             study next. A student report must end with a short motivational message."
        }
    }
}

fn output_shape(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Planner => {
            r#"{"total_questions": 5, "multiple_choice": 3, "short_answer": 2, "difficulty": {"easy": 2, "medium": 2, "hard": 1}, "estimated_minutes": 15}"#
        }
        AgentRole::QuestionGenerator => {
            r#"{"questions": [{"id": 1, "prompt": "...", "type": "multiple_choice", "options": [{"text": "...", "correct": true}], "skill": "...", "difficulty": "easy"}, {"id": 2, "prompt": "...", "type": "short_answer", "canonical": "...", "variants": ["..."], "skill": "...", "difficulty": "medium"}]}"#
        }
        AgentRole::Evaluator => {
            r#"{"evaluations": [{"question_id": 1, "correct": false, "mistake": "calculation_error", "score": 0.5, "rationale": "..."}]}"#
        }
        AgentRole::Explanation => {
            r#"{"explanations": [{"question_id": 1, "hint": "...", "explanation": "..."}]}"#
        }
        AgentRole::Report => {
            r#"{"audience": "student", "headline": "...", "strengths": "...", "weaknesses": "...", "next_steps": "...", "bullet_points": ["..."], "recommended_topics": ["..."], "motivational_message": "..."}"#
        }
    }
}

/// Isolate the outermost JSON object in a model reply.
pub(crate) fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

fn decode<T: DeserializeOwned>(role: AgentRole, reply: &str) -> Result<T, AgentFailure> {
    let json = extract_json(reply)
        .ok_or_else(|| AgentFailure::new(role, "reply contains no JSON object"))?;
    serde_json::from_str(json)
        .map_err(|e| AgentFailure::new(role, format!("reply does not match the output shape: {e}")))
}

#[derive(Deserialize)]
struct QuestionsReply {
    questions: Vec<Question>,
}

#[derive(Deserialize)]
struct EvaluationsReply {
    evaluations: Vec<Evaluation>,
}

#[derive(Deserialize)]
struct ExplanationsReply {
    explanations: Vec<Explanation>,
}

#[async_trait]
impl<B: ReasoningBackend> Agent for JsonAgent<B> {
    async fn produce(&self, input: &StageInput) -> Result<StageOutput, AgentFailure> {
        let role = input.role();
        let prompt = Self::prompt(input)?;
        let reply = self
            .backend
            .complete(&prompt)
            .await
            .map_err(|e| AgentFailure::new(role, e.to_string()))?;
        debug!(%role, bytes = reply.len(), "agent reply received");

        let output = match role {
            AgentRole::Planner => StageOutput::Plan(decode::<WorksheetPlan>(role, &reply)?),
            AgentRole::QuestionGenerator => {
                StageOutput::Questions(decode::<QuestionsReply>(role, &reply)?.questions)
            }
            AgentRole::Evaluator => {
                StageOutput::Evaluations(decode::<EvaluationsReply>(role, &reply)?.evaluations)
            }
            AgentRole::Explanation => {
                StageOutput::Explanations(decode::<ExplanationsReply>(role, &reply)?.explanations)
            }
            AgentRole::Report => StageOutput::Report(decode::<ReportNarrative>(role, &reply)?),
        };
        Ok(output)
    }
}
