mod support;

use std::time::Duration;

use services::{
    AbandonReason, Artifact, LoopState, PipelineDriver, PipelineError, RejectReason, Session,
    SessionEvent, SessionState, Stage, StageInput, StageOutput, StateViolation, SubmitOutcome,
};
use study_core::model::{Audience, SkillTag, Trend};
use support::{ANSWERS, Harness, ReplaySource, ScriptedAgent, request, student};

fn answer_all(driver: &PipelineDriver, session: &mut Session) {
    for raw in ANSWERS {
        driver.next_question(session).unwrap();
        let outcome = driver.submit_answer(session, raw).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Accepted { .. }));
    }
}

async fn prepared(driver: &PipelineDriver) -> Session {
    let mut session = driver.open_session(request()).unwrap();
    driver.prepare(&mut session).await.unwrap();
    assert_eq!(session.state(), SessionState::Running(Stage::Administering));
    session
}

#[tokio::test]
async fn fractions_scenario_updates_profile_and_reports() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut session = prepared(&driver).await;

    answer_all(&driver, &mut session);
    let outcome = driver.complete(&mut session).await.unwrap();

    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(session.answers().len(), session.questions().len());

    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    let fractions = profile.skill(&SkillTag::new("fractions").unwrap()).unwrap();
    assert_eq!(fractions.attempts(), 3);
    assert_eq!(fractions.correct(), 2);
    assert_eq!(fractions.trend(), Trend::Stable);
    let decimals = profile.skill(&SkillTag::new("decimals").unwrap()).unwrap();
    assert_eq!(decimals.attempts(), 2);
    assert_eq!(decimals.correct(), 1);

    let evaluated: Vec<_> = outcome.evaluations.iter().map(|e| e.question_id).collect();
    let asked: Vec<_> = session.questions().iter().map(|q| q.id).collect();
    assert_eq!(evaluated, asked);

    let audiences: Vec<_> = outcome.reports.iter().map(|r| r.audience()).collect();
    assert_eq!(audiences, Audience::ALL.to_vec());
    for report in &outcome.reports {
        assert_eq!(report.facts.session_id, session.id());
        assert_eq!(report.facts.evaluations, outcome.evaluations);
    }
    assert_eq!(outcome.summary.correct(), 3);
    assert_eq!(outcome.summary.total_questions(), 5);

    let history = driver.history(&student(), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].session_id(), session.id());
}

#[tokio::test]
async fn empty_submission_keeps_the_question_waiting() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut session = prepared(&driver).await;

    for raw in &ANSWERS[..2] {
        driver.next_question(&mut session).unwrap();
        driver.submit_answer(&mut session, raw).unwrap();
    }
    driver.next_question(&mut session).unwrap();

    let outcome = driver.submit_answer(&mut session, "   ").unwrap();

    assert_eq!(outcome, SubmitOutcome::Rejected(RejectReason::Empty));
    let worksheet = session.worksheet().unwrap();
    assert_eq!(worksheet.state(), LoopState::AwaitingAnswer(2));
    assert_eq!(session.answers().len(), 2);
}

#[tokio::test]
async fn advancing_an_open_worksheet_is_rejected_without_change() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut session = prepared(&driver).await;

    let err = driver.advance(&mut session).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::State(StateViolation::AwaitingStudent {
            answered: 0,
            total: 5
        })
    ));
    assert_eq!(session.state(), SessionState::Running(Stage::Administering));
    assert!(session.failure().is_none());
}

#[tokio::test]
async fn evaluator_recovers_on_the_last_allowed_attempt() {
    let mut harness = Harness::new();
    harness.evaluator = ScriptedAgent::failing_first(2, support::grade);
    let driver = harness.driver();
    let mut session = prepared(&driver).await;
    answer_all(&driver, &mut session);

    assert_eq!(
        driver.advance(&mut session).await.unwrap(),
        SessionState::Running(Stage::Evaluating)
    );
    let next = driver.advance(&mut session).await.unwrap();

    assert_eq!(next, SessionState::Running(Stage::Explaining));
    assert_eq!(harness.evaluator.calls(), 3);
    assert_eq!(session.evaluations().len(), 5);
    assert_eq!(harness.planner.calls(), 1);
    assert_eq!(harness.generator.calls(), 1);
}

#[tokio::test]
async fn exhausted_retries_error_the_session_and_resume_retries() {
    let mut harness = Harness::new();
    harness.evaluator = ScriptedAgent::failing_first(3, support::grade);
    let driver = harness.driver();
    let mut session = prepared(&driver).await;
    answer_all(&driver, &mut session);
    driver.advance(&mut session).await.unwrap();

    let err = driver.advance(&mut session).await.unwrap_err();

    assert!(matches!(err, PipelineError::Agent(_)));
    assert_eq!(session.state(), SessionState::Errored(Stage::Evaluating));
    let failure = session.failure().unwrap();
    assert_eq!(failure.stage, Stage::Evaluating);
    assert_eq!(
        failure.salvaged,
        vec![Artifact::Plan, Artifact::Questions, Artifact::Answers]
    );
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert!(profile.skills().is_empty());
    assert_eq!(profile.total_sessions(), 0);

    assert_eq!(
        driver.resume(&mut session).unwrap(),
        SessionState::Running(Stage::Evaluating)
    );
    let outcome = driver.complete(&mut session).await.unwrap();

    assert_eq!(harness.evaluator.calls(), 4);
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(outcome.evaluations.len(), 5);
}

#[tokio::test]
async fn schema_violations_are_not_retried() {
    let mut harness = Harness::new();
    harness.generator = ScriptedAgent::new(|input| match input {
        StageInput::Generate(_) => {
            let mut questions = support::questions();
            questions.pop();
            Ok(StageOutput::Questions(questions))
        }
        other => Err(services::AgentFailure::new(other.role(), "unexpected")),
    });
    let driver = harness.driver();
    let mut session = driver.open_session(request()).unwrap();

    let err = driver.prepare(&mut session).await.unwrap_err();

    assert!(matches!(err, PipelineError::Schema(_)));
    assert_eq!(session.state(), SessionState::Errored(Stage::Generating));
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(session.failure().unwrap().salvaged, vec![Artifact::Plan]);
}

#[tokio::test]
async fn wrong_output_variant_is_a_schema_violation() {
    let mut harness = Harness::new();
    harness.planner = ScriptedAgent::new(support::questions_output_for_any);
    let driver = harness.driver();
    let mut session = driver.open_session(request()).unwrap();

    let err = driver.advance(&mut session).await.unwrap_err();

    assert!(matches!(err, PipelineError::Schema(ref v) if v.field == "output"));
    assert_eq!(session.state(), SessionState::Errored(Stage::Planning));
}

#[tokio::test]
async fn cancelled_worksheet_never_reaches_the_evaluator() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut session = prepared(&driver).await;
    driver.next_question(&mut session).unwrap();
    driver.submit_answer(&mut session, ANSWERS[0]).unwrap();

    driver.cancel(&mut session).unwrap();

    assert_eq!(session.state(), SessionState::Abandoned);
    assert_eq!(
        session.worksheet().unwrap().state(),
        LoopState::Abandoned(AbandonReason::Cancelled)
    );
    let err = driver.advance(&mut session).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::State(StateViolation::Terminal(SessionState::Abandoned))
    ));
    assert_eq!(harness.evaluator.calls(), 0);
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert_eq!(profile.total_sessions(), 0);
}

#[tokio::test]
async fn cancel_is_refused_once_progress_is_staged() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut session = prepared(&driver).await;
    answer_all(&driver, &mut session);
    while session.state() != SessionState::Running(Stage::UpdatingProgress) {
        driver.advance(&mut session).await.unwrap();
    }

    let err = driver.cancel(&mut session).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::State(StateViolation::CancelTooLate(Stage::UpdatingProgress))
    ));
    assert_eq!(session.state(), SessionState::Running(Stage::UpdatingProgress));
}

#[tokio::test]
async fn report_for_the_wrong_audience_leaves_the_store_untouched() {
    let mut harness = Harness::new();
    harness.reporter = ScriptedAgent::new(|_| {
        Ok(StageOutput::Report(support::narrative(Audience::Student, 3, 5)))
    });
    let driver = harness.driver();
    let mut session = prepared(&driver).await;
    answer_all(&driver, &mut session);

    let err = driver.complete(&mut session).await.unwrap_err();

    assert!(matches!(err, PipelineError::Schema(ref v) if v.field == "audience"));
    assert_eq!(session.state(), SessionState::Errored(Stage::Reporting));
    assert_eq!(
        session.failure().unwrap().salvaged,
        vec![
            Artifact::Plan,
            Artifact::Questions,
            Artifact::Answers,
            Artifact::Evaluations,
            Artifact::Explanations,
        ]
    );
    assert!(session.staged_progress().is_some());
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert_eq!(profile.total_sessions(), 0);
    assert!(profile.skills().is_empty());
    assert!(driver.history(&student(), 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn reporter_outage_commits_nothing_until_resumed() {
    let mut harness = Harness::new();
    harness.reporter = ScriptedAgent::failing_first(3, support::narrate);
    let driver = harness.driver();
    let mut session = prepared(&driver).await;
    answer_all(&driver, &mut session);

    let err = driver.complete(&mut session).await.unwrap_err();

    assert!(matches!(err, PipelineError::Agent(_)));
    assert_eq!(session.state(), SessionState::Errored(Stage::Reporting));
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert_eq!(profile.total_sessions(), 0);
    assert!(driver.history(&student(), 5).await.unwrap().is_empty());

    driver.resume(&mut session).unwrap();
    let outcome = driver.complete(&mut session).await.unwrap();

    assert_eq!(harness.evaluator.calls(), 1);
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert_eq!(profile.total_sessions(), 1);
    let fractions = profile.skill(&SkillTag::new("fractions").unwrap()).unwrap();
    assert_eq!(fractions.attempts(), 3);
    assert_eq!(outcome.updated_skills.len(), 2);
    assert_eq!(driver.history(&student(), 5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn run_returns_the_errored_session_when_reporting_fails() {
    let mut harness = Harness::new();
    harness.reporter = ScriptedAgent::failing_first(u32::MAX, support::narrate);
    let driver = harness.driver();
    let mut source = ReplaySource::answering(&ANSWERS);

    let session = driver.run(request(), &mut source).await.unwrap();

    assert_eq!(session.state(), SessionState::Errored(Stage::Reporting));
    assert_eq!(session.failure().unwrap().stage, Stage::Reporting);
    assert_eq!(harness.reporter.calls(), 3);
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert_eq!(profile.total_sessions(), 0);
}

#[tokio::test]
async fn planner_sees_the_updated_profile_next_time() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut source = ReplaySource::answering(&ANSWERS);
    let first = driver.run(request(), &mut source).await.unwrap();
    assert_eq!(first.state(), SessionState::Done);

    let mut second = driver.open_session(request()).unwrap();
    driver.advance(&mut second).await.unwrap();

    let inputs = harness.planner.inputs();
    let Some(StageInput::Plan(plan)) = inputs.last() else {
        panic!("planner was not called with a plan request");
    };
    assert_eq!(plan.skills.len(), 2);
    assert_eq!(plan.focus_skills, vec![SkillTag::new("decimals").unwrap()]);
    assert_eq!(plan.last_percentage, Some(60.0));
}

#[tokio::test]
async fn subscribers_see_the_session_unfold() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut events = driver.subscribe();
    let mut source = ReplaySource::answering(&ANSWERS);

    let session = driver.run(request(), &mut source).await.unwrap();

    let mut recorded = 0;
    let mut presented = 0;
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.session_id(), session.id());
        match event {
            SessionEvent::AnswerRecorded { .. } => recorded += 1,
            SessionEvent::QuestionPresented { .. } => presented += 1,
            SessionEvent::StateChanged { to, .. } => finished |= to == SessionState::Done,
            SessionEvent::AnswerRejected { .. } => {}
        }
    }
    assert_eq!(recorded, 5);
    assert_eq!(presented, 5);
    assert!(finished);
}

#[tokio::test]
async fn source_without_an_answer_cancels_the_run() {
    let harness = Harness::new();
    let driver = harness.driver();
    let mut source = ReplaySource::new(&[Some("1"), None]);

    let session = driver.run(request(), &mut source).await.unwrap();

    assert_eq!(session.state(), SessionState::Abandoned);
    assert_eq!(session.answers().len(), 1);
    assert_eq!(harness.evaluator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn run_abandons_when_the_student_goes_quiet() {
    let mut harness = Harness::new();
    harness.config = harness
        .config
        .clone()
        .with_answer_timeout(Duration::from_secs(30));
    let driver = harness.driver();
    let mut source = ReplaySource::answering(&ANSWERS[..2]);

    let session = driver.run(request(), &mut source).await.unwrap();

    assert_eq!(session.state(), SessionState::Abandoned);
    assert_eq!(
        session.worksheet().unwrap().state(),
        LoopState::Abandoned(AbandonReason::TimedOut)
    );
    assert_eq!(session.answers().len(), 2);
    assert_eq!(harness.evaluator.calls(), 0);
    let profile = harness.storage.progress.get_profile(&student()).await.unwrap();
    assert_eq!(profile.total_sessions(), 0);
}
