use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use storage::Storage;
use study_core::Clock;
use study_core::model::{
    Audience, ProgressBatch, Question, Report, ReportFacts, SessionId, SessionSummary,
    StudentId, StudyRequest, validate_evaluations, validate_explanations, validate_question_set,
};

use super::events::SessionEvent;
use super::session::{Session, SessionOutcome, SessionState, Stage};
use crate::agents::{
    AgentRole, AgentSet, EvaluationRequest, ExplanationRequest, GenerationRequest, PlanRequest,
    ReportRequest, StageInput, StageOutput,
};
use crate::config::PipelineConfig;
use crate::error::{AgentFailure, PipelineError, StateViolation};
use crate::worksheet_loop::{AbandonReason, LoopState, SubmitOutcome, WorksheetLoop};

const EVENT_CAPACITY: usize = 64;

/// Supplies student answers to [`PipelineDriver::run`].
#[async_trait]
pub trait AnswerSource: Send {
    /// Wait for the answer to `question`, shown at position `index`. `None` cancels
    /// the session.
    async fn next_answer(&mut self, question: &Question, index: usize) -> Option<String>;
}

/// Drives sessions through the fixed stage order, validating every stage output
/// before moving on.
#[derive(Clone)]
pub struct PipelineDriver {
    agents: AgentSet,
    storage: Storage,
    clock: Clock,
    config: PipelineConfig,
    events: broadcast::Sender<SessionEvent>,
}

impl PipelineDriver {
    #[must_use]
    pub fn new(agents: AgentSet, storage: Storage, clock: Clock, config: PipelineConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            agents,
            storage,
            clock,
            config,
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Receive events for every session this driver touches from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Archived sessions for a student, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Storage` if the archive cannot be read.
    pub async fn history(
        &self,
        student: &StudentId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, PipelineError> {
        Ok(self.storage.sessions.list_summaries(student, limit).await?)
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Validate the request and start a session at planning.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Schema` if the request is invalid.
    pub fn open_session(&self, request: StudyRequest) -> Result<Session, PipelineError> {
        request.validate()?;
        let session = Session::new(SessionId::new_v4(), request, self.clock.now());
        info!(
            session = %session.id(),
            student = %session.student(),
            topic = %session.request().topic,
            "session opened"
        );
        Ok(session)
    }

    /// Run exactly the current stage and move to the next state.
    ///
    /// Agent failures are retried up to the configured attempt bound. When the bound
    /// is exhausted, or the output breaks its schema, or storage fails, the session
    /// moves to `Errored(stage)` with a failure report.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::State` without touching the session if the session is
    /// not running or the worksheet is still open. Returns the stage's error after
    /// moving the session to `Errored`.
    pub async fn advance(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let stage = match session.state() {
            SessionState::Running(stage) => stage,
            other @ (SessionState::Done | SessionState::Abandoned) => {
                return Err(StateViolation::Terminal(other).into());
            }
            other @ SessionState::Errored(stage) => {
                return Err(StateViolation::WrongStage {
                    expected: stage,
                    actual: other,
                }
                .into());
            }
        };

        let result = match stage {
            Stage::Planning => self.plan(session).await,
            Stage::Generating => self.generate(session).await,
            Stage::Administering => self.close_worksheet(session),
            Stage::Evaluating => self.evaluate(session).await,
            Stage::Explaining => self.explain(session).await,
            Stage::UpdatingProgress => self.update_progress(session).await,
            Stage::Reporting => self.report(session).await,
        };

        match result {
            Ok(next) => {
                self.transition(session, next);
                Ok(next)
            }
            Err(PipelineError::State(violation)) => Err(violation.into()),
            Err(err) => {
                warn!(session = %session.id(), %stage, error = %err, "stage failed");
                let from = session.state();
                session.fail(stage, err.to_string(), self.clock.now());
                self.publish(SessionEvent::StateChanged {
                    session_id: session.id(),
                    from,
                    to: session.state(),
                });
                Err(err)
            }
        }
    }

    /// Advance through planning and generation so the worksheet is ready.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; see [`PipelineDriver::advance`].
    pub async fn prepare(&self, session: &mut Session) -> Result<(), PipelineError> {
        while let SessionState::Running(Stage::Planning | Stage::Generating) = session.state() {
            self.advance(session).await?;
        }
        match session.state() {
            SessionState::Running(Stage::Administering) => Ok(()),
            other => Err(StateViolation::WrongStage {
                expected: Stage::Planning,
                actual: other,
            }
            .into()),
        }
    }

    /// Advance from the end of the worksheet through reporting.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation::WrongStage` before the worksheet is reached, or the first
    /// stage error; see [`PipelineDriver::advance`].
    pub async fn complete(&self, session: &mut Session) -> Result<SessionOutcome, PipelineError> {
        loop {
            match session.state() {
                SessionState::Running(stage) if stage >= Stage::Administering => {
                    self.advance(session).await?;
                }
                SessionState::Done => break,
                other => {
                    return Err(StateViolation::WrongStage {
                        expected: Stage::Evaluating,
                        actual: other,
                    }
                    .into());
                }
            }
        }
        session
            .outcome()
            .ok_or_else(|| StateViolation::MissingArtifact("session summary").into())
    }

    /// Abandon the session. Allowed until progress is staged.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation` once progress is staged or the session finished.
    pub fn cancel(&self, session: &mut Session) -> Result<(), PipelineError> {
        match session.state() {
            SessionState::Running(stage) | SessionState::Errored(stage) => {
                if stage >= Stage::UpdatingProgress {
                    return Err(StateViolation::CancelTooLate(stage).into());
                }
            }
            other => return Err(StateViolation::Terminal(other).into()),
        }
        if let Some(worksheet) = session.worksheet_mut() {
            if !worksheet.state().is_terminal() {
                worksheet.abandon(AbandonReason::Cancelled)?;
            }
        }
        info!(session = %session.id(), "session cancelled");
        self.transition(session, SessionState::Abandoned);
        Ok(())
    }

    /// Return an errored session to its failed stage so it can be retried.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation::NotErrored` unless the session is errored.
    pub fn resume(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let SessionState::Errored(stage) = session.state() else {
            return Err(StateViolation::NotErrored(session.state()).into());
        };
        info!(session = %session.id(), %stage, "session resumed");
        let next = SessionState::Running(stage);
        self.transition(session, next);
        Ok(next)
    }

    //
    // ─── PRESENTATION BOUNDARY ─────────────────────────────────────────────────
    //

    /// Present the current worksheet question.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation` outside the administering stage or once the worksheet
    /// is closed.
    pub fn next_question(&self, session: &mut Session) -> Result<Question, PipelineError> {
        Self::require_administering(session)?;
        let now = self.clock.now();
        let session_id = session.id();
        let worksheet = session
            .worksheet_mut()
            .ok_or(StateViolation::MissingArtifact("worksheet"))?;
        let question = worksheet.present(now)?.clone();
        if let LoopState::AwaitingAnswer(index) = worksheet.state() {
            self.publish(SessionEvent::QuestionPresented {
                session_id,
                index,
                question_id: question.id,
            });
        }
        Ok(question)
    }

    /// Submit the student's response to the presented question.
    ///
    /// An expired answer window abandons the session.
    ///
    /// # Errors
    ///
    /// Returns `StateViolation` outside the administering stage or when no question is
    /// awaiting an answer.
    pub fn submit_answer(
        &self,
        session: &mut Session,
        raw: &str,
    ) -> Result<SubmitOutcome, PipelineError> {
        Self::require_administering(session)?;
        let now = self.clock.now();
        let session_id = session.id();
        let worksheet = session
            .worksheet_mut()
            .ok_or(StateViolation::MissingArtifact("worksheet"))?;
        let pending = match worksheet.state() {
            LoopState::AwaitingAnswer(index) => worksheet.questions().get(index).map(|q| q.id),
            _ => None,
        };
        let outcome = worksheet.submit(raw, now)?;
        let progress = worksheet.progress();

        match outcome {
            SubmitOutcome::Accepted { question_id, .. } => {
                self.publish(SessionEvent::AnswerRecorded {
                    session_id,
                    question_id,
                    answered: progress.answered,
                    total: progress.total,
                });
            }
            SubmitOutcome::Rejected(reason) => {
                warn!(session = %session_id, ?reason, "answer rejected");
                if let Some(question_id) = pending {
                    self.publish(SessionEvent::AnswerRejected {
                        session_id,
                        question_id,
                        reason,
                    });
                }
            }
            SubmitOutcome::Expired => {
                warn!(session = %session_id, "answer window expired");
                self.transition(session, SessionState::Abandoned);
            }
        }
        Ok(outcome)
    }

    /// Drive a whole session, asking `source` for each answer.
    ///
    /// Stage failures do not surface as `Err`: the returned session is `Errored` and
    /// carries a failure report. A source that returns `None` cancels the session and
    /// a source that outlives the answer timeout abandons it.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Schema` if the request is invalid, or the driver's error
    /// when the session stops without having errored or finished.
    pub async fn run(
        &self,
        request: StudyRequest,
        source: &mut dyn AnswerSource,
    ) -> Result<Session, PipelineError> {
        let mut session = self.open_session(request)?;
        if let Err(err) = self.prepare(&mut session).await {
            return Self::settle(session, err);
        }

        while let Some(worksheet) = session.worksheet() {
            if worksheet.state().is_terminal() {
                break;
            }
            let question = self.next_question(&mut session)?;
            let index = match session.worksheet().map(WorksheetLoop::state) {
                Some(LoopState::AwaitingAnswer(index)) => index,
                _ => break,
            };

            let answer = match self.remaining_window(&session) {
                Some(window) => {
                    match tokio::time::timeout(window, source.next_answer(&question, index)).await
                    {
                        Ok(answer) => answer,
                        Err(_) => {
                            warn!(session = %session.id(), index, "answer timed out");
                            self.abandon_worksheet(&mut session, AbandonReason::TimedOut)?;
                            break;
                        }
                    }
                }
                None => source.next_answer(&question, index).await,
            };

            match answer {
                Some(raw) => {
                    self.submit_answer(&mut session, &raw)?;
                }
                None => {
                    self.cancel(&mut session)?;
                    break;
                }
            }
        }

        if session.state() == SessionState::Running(Stage::Administering) {
            if let Err(err) = self.complete(&mut session).await {
                return Self::settle(session, err);
            }
        }
        Ok(session)
    }

    //
    // ─── STAGES ────────────────────────────────────────────────────────────────
    //

    async fn plan(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let profile = self.storage.progress.get_profile(session.student()).await?;
        let input = StageInput::Plan(PlanRequest::new(session.request(), &profile));
        let plan = self.invoke(&input).await?.into_plan()?;
        plan.validate()?;
        session.set_plan(profile, plan);
        Ok(SessionState::Running(Stage::Generating))
    }

    async fn generate(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let plan = session
            .plan()
            .cloned()
            .ok_or(StateViolation::MissingArtifact("worksheet plan"))?;
        let input = StageInput::Generate(GenerationRequest::new(
            session.request(),
            plan.clone(),
            session.profile(),
        ));
        let questions = self.invoke(&input).await?.into_questions()?;
        validate_question_set(&questions, &plan)?;

        let timeout = self
            .config
            .answer_timeout
            .and_then(|t| Duration::from_std(t).ok());
        let worksheet = WorksheetLoop::new(questions.clone(), timeout);
        session.set_questions(questions, worksheet);
        Ok(SessionState::Running(Stage::Administering))
    }

    fn close_worksheet(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let now = self.clock.now();
        let worksheet = session
            .worksheet_mut()
            .ok_or(StateViolation::MissingArtifact("worksheet"))?;
        worksheet.expire(now);
        match worksheet.state() {
            LoopState::Complete => {
                session.close_worksheet();
                Ok(SessionState::Running(Stage::Evaluating))
            }
            LoopState::Abandoned(_) => Ok(SessionState::Abandoned),
            LoopState::Presenting(_) | LoopState::AwaitingAnswer(_) => {
                let progress = worksheet.progress();
                Err(StateViolation::AwaitingStudent {
                    answered: progress.answered,
                    total: progress.total,
                }
                .into())
            }
        }
    }

    async fn evaluate(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let input = StageInput::Evaluate(EvaluationRequest {
            questions: session.questions().to_vec(),
            answers: session.answers().to_vec(),
        });
        let evaluations = self.invoke(&input).await?.into_evaluations()?;
        validate_evaluations(session.answers(), &evaluations)?;
        session.set_evaluations(evaluations);
        Ok(SessionState::Running(Stage::Explaining))
    }

    async fn explain(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let input = StageInput::Explain(ExplanationRequest {
            questions: session.questions().to_vec(),
            answers: session.answers().to_vec(),
            evaluations: session.evaluations().to_vec(),
        });
        let explanations = self.invoke(&input).await?.into_explanations()?;
        validate_explanations(session.questions(), &explanations)?;
        session.set_explanations(explanations);
        Ok(SessionState::Running(Stage::UpdatingProgress))
    }

    async fn update_progress(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let batch = ProgressBatch::from_evaluations(
            session.id(),
            session.request().topic.clone(),
            session.questions(),
            session.evaluations(),
            self.clock.now(),
        )?;
        // Fold into a copy; the store is written after reporting succeeds.
        let mut preview = self.storage.progress.get_profile(session.student()).await?;
        let updated = preview.apply(&batch);
        session.stage_progress(batch, updated);
        Ok(SessionState::Running(Stage::Reporting))
    }

    async fn report(&self, session: &mut Session) -> Result<SessionState, PipelineError> {
        let batch = session
            .staged_progress()
            .cloned()
            .ok_or(StateViolation::MissingArtifact("staged progress"))?;
        let updated = session
            .updated_skills()
            .ok_or(StateViolation::MissingArtifact("updated skill records"))?;
        let summary = SessionSummary::from_evaluations(
            session.id(),
            session.student().clone(),
            session.request().topic.clone(),
            session.created_at(),
            self.clock.now(),
            session.evaluations(),
        )?;
        let facts = ReportFacts::compose(summary.clone(), session.evaluations().to_vec(), updated);

        let mut reports = Vec::with_capacity(Audience::ALL.len());
        for audience in Audience::ALL {
            let request = session.request();
            let input = StageInput::Report(ReportRequest {
                audience,
                grade: request.grade.clone(),
                subject: request.subject.clone(),
                topic: request.topic.clone(),
                facts: facts.clone(),
            });
            let narrative = self.invoke(&input).await?.into_report()?;
            narrative.validate(audience)?;
            reports.push(Report {
                narrative,
                facts: facts.clone(),
            });
        }

        // Profile commit goes last. The archive upsert is safe to repeat on resume.
        self.storage.sessions.upsert_summary(&summary).await?;
        let committed = self.storage.progress.update(session.student(), &batch).await?;
        info!(
            session = %session.id(),
            skills = committed.len(),
            "progress committed"
        );
        session.set_reports(summary, reports, committed);
        Ok(SessionState::Done)
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, AgentFailure> {
        let role: AgentRole = input.role();
        let agent = Arc::clone(self.agents.for_role(role));
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match agent.produce(input).await {
                Ok(output) => return Ok(output),
                Err(failure) if attempt < max_attempts => {
                    warn!(
                        %role,
                        attempt,
                        max_attempts,
                        cause = %failure.cause,
                        "agent failed, retrying"
                    );
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    /// A session that errored or ended carries its own outcome. Anything else left it
    /// stuck mid-stage, so the error goes to the caller.
    fn settle(session: Session, err: PipelineError) -> Result<Session, PipelineError> {
        match session.state() {
            SessionState::Errored(_) | SessionState::Done | SessionState::Abandoned => {
                Ok(session)
            }
            SessionState::Running(stage) => {
                warn!(session = %session.id(), %stage, error = %err, "run stopped mid-stage");
                Err(err)
            }
        }
    }

    fn require_administering(session: &Session) -> Result<(), StateViolation> {
        match session.state() {
            SessionState::Running(Stage::Administering) => Ok(()),
            other if other.is_terminal() => Err(StateViolation::Terminal(other)),
            other => Err(StateViolation::WrongStage {
                expected: Stage::Administering,
                actual: other,
            }),
        }
    }

    fn remaining_window(&self, session: &Session) -> Option<StdDuration> {
        let deadline = session.worksheet()?.deadline()?;
        let remaining = deadline.signed_duration_since(self.clock.now());
        Some(remaining.to_std().unwrap_or(StdDuration::ZERO))
    }

    fn abandon_worksheet(
        &self,
        session: &mut Session,
        reason: AbandonReason,
    ) -> Result<(), PipelineError> {
        if let Some(worksheet) = session.worksheet_mut() {
            worksheet.abandon(reason)?;
        }
        self.transition(session, SessionState::Abandoned);
        Ok(())
    }

    fn transition(&self, session: &mut Session, to: SessionState) {
        let from = session.state();
        if from == to {
            return;
        }
        session.set_state(to, self.clock.now());
        info!(session = %session.id(), %from, %to, "session state changed");
        self.publish(SessionEvent::StateChanged {
            session_id: session.id(),
            from,
            to,
        });
    }

    fn publish(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}
