//! Shared error types for the services crate.

use thiserror::Error;

use storage::StorageError;
use study_core::SchemaViolation;
use study_core::model::SessionSummaryError;

use crate::agents::AgentRole;
use crate::sessions::{SessionState, Stage};

/// A stage agent could not produce usable output. Retried by the driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{stage} agent failed: {cause}")]
pub struct AgentFailure {
    pub stage: AgentRole,
    pub cause: String,
}

impl AgentFailure {
    #[must_use]
    pub fn new(stage: AgentRole, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

/// An operation was requested in a state that does not allow it. Never retried and
/// never changes the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateViolation {
    #[error("no question is awaiting an answer")]
    NotAwaitingAnswer,
    #[error("the worksheet is closed")]
    LoopClosed,
    #[error("the worksheet is still open ({answered} of {total} answered)")]
    AwaitingStudent { answered: usize, total: usize },
    #[error("operation needs stage {expected}, session is {actual}")]
    WrongStage {
        expected: Stage,
        actual: SessionState,
    },
    #[error("cannot cancel once the session reached {0}")]
    CancelTooLate(Stage),
    #[error("session is {0}")]
    Terminal(SessionState),
    #[error("session is {0}, not errored")]
    NotErrored(SessionState),
    #[error("{0} is missing from the session")]
    MissingArtifact(&'static str),
}

/// Errors emitted by a reasoning backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("reasoning backend returned an empty response")]
    EmptyResponse,
    #[error("reasoning backend request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while reading configuration from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Errors emitted by the pipeline driver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error(transparent)]
    Agent(#[from] AgentFailure),
    #[error(transparent)]
    State(#[from] StateViolation),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
}
