#![forbid(unsafe_code)]

pub mod agents;
pub mod config;
pub mod error;
pub mod sessions;
pub mod worksheet_loop;

pub use study_core::Clock;

pub use agents::{
    Agent, AgentRole, AgentSet, ChatCompletionsBackend, JsonAgent, ReasoningBackend, StageInput,
    StageOutput,
};
pub use config::{BackendConfig, PipelineConfig};
pub use error::{AgentFailure, BackendError, ConfigError, PipelineError, StateViolation};
pub use sessions::{
    AnswerSource, Artifact, FailureReport, PipelineDriver, Session, SessionEvent, SessionOutcome,
    SessionState, Stage,
};
pub use worksheet_loop::{
    AbandonReason, LoopState, RejectReason, SubmitOutcome, WorksheetLoop, WorksheetProgress,
};
