mod answer;
mod evaluation;
mod explanation;
mod ids;
mod plan;
mod profile;
mod question;
mod report;
mod request;
mod skill;
mod summary;
mod tag;

pub use answer::Answer;
pub use evaluation::{Evaluation, EvaluationSummary, MistakeType, validate_evaluations};
pub use explanation::{Explanation, validate_explanations};
pub use ids::{IdError, QuestionId, SessionId, StudentId};
pub use plan::{DifficultyMix, WorksheetPlan};
pub use profile::{ProgressBatch, SkillOutcome, StudentProfile};
pub use question::{ChoiceOption, Difficulty, Question, QuestionKind, validate_question_set};
pub use report::{Audience, Report, ReportFacts, ReportNarrative};
pub use request::{DifficultyPreference, StudyRequest};
pub use skill::{
    FOCUS_ACCURACY, STRENGTH_ACCURACY, SessionTally, SkillRecord, SkillSnapshot, TREND_THRESHOLD_POINTS,
    TREND_WINDOW, Trend,
};
pub use summary::{SessionSummary, SessionSummaryError};
pub use tag::{SkillTag, TagError};
