pub mod config;
pub mod evaluation;
pub mod exec;
pub mod language;
pub mod score;
pub mod submission;
pub mod task;
pub mod verdict;

pub use config::GradingConfig;
pub use evaluation::{
    EvalError, EvalErrorKind, EvalStage, Evaluation, ScoreUnit, Subtask, Test, TestGroup,
};
pub use exec::{ExecEvent, ExecLimits, ExecRequest, ExecTestFile, RunData};
pub use language::Language;
pub use score::{BestScore, ScoreBar, ScoreInfo, best_scores_by_task};
pub use submission::Submission;
pub use task::{Task, TaskSubtask, TaskTest, TaskTestGroup};
pub use verdict::Verdict;

/// A string did not name any variant of one of the model enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
