#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use services::{
    Agent, AgentFailure, AgentSet, AnswerSource, Clock, PipelineConfig, PipelineDriver,
    StageInput, StageOutput,
};
use storage::Storage;
use study_core::model::{
    Audience, ChoiceOption, Difficulty, DifficultyMix, DifficultyPreference, Evaluation,
    Explanation, MistakeType, Question, QuestionId, QuestionKind, ReportNarrative, SkillTag,
    StudentId, StudyRequest, WorksheetPlan,
};
use study_core::time::fixed_now;

type Respond = dyn Fn(&StageInput) -> Result<StageOutput, AgentFailure> + Send + Sync;

/// Agent driven by a closure, optionally failing its first calls.
pub struct ScriptedAgent {
    respond: Box<Respond>,
    fail_first: u32,
    calls: AtomicU32,
    inputs: Mutex<Vec<StageInput>>,
}

impl ScriptedAgent {
    pub fn new(
        respond: impl Fn(&StageInput) -> Result<StageOutput, AgentFailure> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::failing_first(0, respond)
    }

    pub fn failing_first(
        fail_first: u32,
        respond: impl Fn(&StageInput) -> Result<StageOutput, AgentFailure> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            fail_first,
            calls: AtomicU32::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<StageInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn produce(&self, input: &StageInput) -> Result<StageOutput, AgentFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().unwrap().push(input.clone());
        if call <= self.fail_first {
            return Err(AgentFailure::new(
                input.role(),
                format!("scripted failure {call}"),
            ));
        }
        (self.respond)(input)
    }
}

//
// ─── FIXTURES ──────────────────────────────────────────────────────────────────
//

pub fn student() -> StudentId {
    StudentId::new("demo_student_1").unwrap()
}

pub fn request() -> StudyRequest {
    StudyRequest {
        student: student(),
        grade: "Year 5".into(),
        subject: "Maths".into(),
        topic: "Fractions and decimals".into(),
        time_minutes: 20,
        difficulty: DifficultyPreference::Mixed,
    }
}

pub fn plan() -> WorksheetPlan {
    WorksheetPlan {
        total_questions: 5,
        multiple_choice: 2,
        short_answer: 3,
        difficulty: DifficultyMix {
            easy: 2,
            medium: 2,
            hard: 1,
        },
        estimated_minutes: 15,
    }
}

fn choice(id: u32, prompt: &str, options: &[(&str, bool)], difficulty: Difficulty) -> Question {
    Question {
        id: QuestionId::new(id),
        prompt: prompt.into(),
        kind: QuestionKind::MultipleChoice {
            options: options
                .iter()
                .map(|(text, correct)| ChoiceOption::new(*text, *correct))
                .collect(),
        },
        skill: SkillTag::new("fractions").unwrap(),
        difficulty,
    }
}

fn short(id: u32, prompt: &str, canonical: &str, skill: &str, difficulty: Difficulty) -> Question {
    Question {
        id: QuestionId::new(id),
        prompt: prompt.into(),
        kind: QuestionKind::ShortAnswer {
            canonical: canonical.into(),
            variants: Vec::new(),
        },
        skill: SkillTag::new(skill).unwrap(),
        difficulty,
    }
}

/// Five questions, three of them tagged "fractions".
pub fn questions() -> Vec<Question> {
    vec![
        choice(
            1,
            "Which fraction equals 1/2?",
            &[("2/4", true), ("1/3", false), ("3/4", false)],
            Difficulty::Easy,
        ),
        short(2, "1/4 + 1/4 = ?", "1/2", "fractions", Difficulty::Easy),
        short(3, "0.5 + 0.25 = ?", "0.75", "decimals", Difficulty::Medium),
        choice(
            4,
            "Which is larger?",
            &[("3/4", true), ("2/3", false)],
            Difficulty::Medium,
        ),
        short(5, "0.1 x 10 = ?", "1", "decimals", Difficulty::Hard),
    ]
}

/// Responses for `questions()`: fractions 2 of 3 correct, decimals 1 of 2.
pub const ANSWERS: [&str; 5] = ["1", "2/4", "0.75", "3/4", "10"];

fn is_correct(question: &Question, raw: &str) -> bool {
    match &question.kind {
        QuestionKind::MultipleChoice { options } => question
            .resolve_choice(raw)
            .and_then(|index| options.get(index))
            .is_some_and(|option| option.correct),
        QuestionKind::ShortAnswer {
            canonical,
            variants,
        } => {
            let raw = raw.trim();
            canonical.eq_ignore_ascii_case(raw) || variants.iter().any(|v| v.eq_ignore_ascii_case(raw))
        }
    }
}

fn unexpected(input: &StageInput) -> AgentFailure {
    AgentFailure::new(input.role(), "unexpected stage input")
}

pub fn plan_output(input: &StageInput) -> Result<StageOutput, AgentFailure> {
    match input {
        StageInput::Plan(_) => Ok(StageOutput::Plan(plan())),
        other => Err(unexpected(other)),
    }
}

pub fn questions_output(input: &StageInput) -> Result<StageOutput, AgentFailure> {
    match input {
        StageInput::Generate(_) => Ok(StageOutput::Questions(questions())),
        other => Err(unexpected(other)),
    }
}

pub fn grade(input: &StageInput) -> Result<StageOutput, AgentFailure> {
    let StageInput::Evaluate(request) = input else {
        return Err(unexpected(input));
    };
    let evaluations = request
        .answers
        .iter()
        .filter_map(|answer| {
            let question = request.questions.iter().find(|q| q.id == answer.question_id)?;
            let correct = is_correct(question, &answer.response);
            Some(Evaluation {
                question_id: answer.question_id,
                correct,
                mistake: if correct {
                    MistakeType::Correct
                } else {
                    MistakeType::CalculationError
                },
                score: if correct { 1.0 } else { 0.0 },
                rationale: format!("expected {}", question.expected_answer().unwrap_or("?")),
            })
        })
        .collect();
    Ok(StageOutput::Evaluations(evaluations))
}

pub fn explain(input: &StageInput) -> Result<StageOutput, AgentFailure> {
    let StageInput::Explain(request) = input else {
        return Err(unexpected(input));
    };
    let explanations = request
        .questions
        .iter()
        .map(|q| Explanation {
            question_id: q.id,
            hint: format!("Think about {}", q.skill),
            explanation: format!("The answer is {}.", q.expected_answer().unwrap_or("?")),
        })
        .collect();
    Ok(StageOutput::Explanations(explanations))
}

pub fn narrate(input: &StageInput) -> Result<StageOutput, AgentFailure> {
    let StageInput::Report(request) = input else {
        return Err(unexpected(input));
    };
    let summary = &request.facts.summary;
    Ok(StageOutput::Report(narrative(
        request.audience,
        summary.correct(),
        summary.total_questions(),
    )))
}

pub fn narrative(audience: Audience, correct: u32, total: u32) -> ReportNarrative {
    ReportNarrative {
        audience,
        headline: format!("{correct} of {total} correct"),
        strengths: "Comparing fractions.".into(),
        weaknesses: "Multiplying decimals.".into(),
        next_steps: "Practice place value.".into(),
        bullet_points: vec![format!("Score: {correct}/{total}")],
        recommended_topics: vec!["Decimal place value".into()],
        motivational_message: Some("Nice work, keep practising!".into()),
    }
}

//
// ─── HARNESS ───────────────────────────────────────────────────────────────────
//

pub struct Harness {
    pub planner: Arc<ScriptedAgent>,
    pub generator: Arc<ScriptedAgent>,
    pub evaluator: Arc<ScriptedAgent>,
    pub explainer: Arc<ScriptedAgent>,
    pub reporter: Arc<ScriptedAgent>,
    pub storage: Storage,
    pub config: PipelineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            planner: ScriptedAgent::new(plan_output),
            generator: ScriptedAgent::new(questions_output),
            evaluator: ScriptedAgent::new(grade),
            explainer: ScriptedAgent::new(explain),
            reporter: ScriptedAgent::new(narrate),
            storage: Storage::in_memory(),
            config: PipelineConfig::default(),
        }
    }

    pub fn driver(&self) -> PipelineDriver {
        let agents = AgentSet {
            planner: self.planner.clone(),
            generator: self.generator.clone(),
            evaluator: self.evaluator.clone(),
            explainer: self.explainer.clone(),
            reporter: self.reporter.clone(),
        };
        PipelineDriver::new(
            agents,
            self.storage.clone(),
            Clock::fixed(fixed_now()),
            self.config.clone(),
        )
    }
}

/// Answer source replaying fixed responses. `None` entries cancel; running out of
/// responses waits forever.
pub struct ReplaySource {
    responses: Vec<Option<String>>,
    next: usize,
}

impl ReplaySource {
    pub fn new(responses: &[Option<&str>]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.map(str::to_owned)).collect(),
            next: 0,
        }
    }

    pub fn answering(answers: &[&str]) -> Self {
        Self {
            responses: answers.iter().map(|a| Some((*a).to_owned())).collect(),
            next: 0,
        }
    }
}

#[async_trait]
impl AnswerSource for ReplaySource {
    async fn next_answer(&mut self, _question: &Question, _index: usize) -> Option<String> {
        let Some(response) = self.responses.get(self.next).cloned() else {
            return std::future::pending().await;
        };
        self.next += 1;
        response
    }
}

/// Returns a question set whatever it is asked for.
pub fn questions_output_for_any(_input: &StageInput) -> Result<StageOutput, AgentFailure> {
    Ok(StageOutput::Questions(questions()))
}
