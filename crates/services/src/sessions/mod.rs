mod driver;
mod events;
mod session;

// Public API of the session subsystem.
pub use driver::{AnswerSource, PipelineDriver};
pub use events::SessionEvent;
pub use session::{Artifact, FailureReport, Session, SessionOutcome, SessionState, Stage};
