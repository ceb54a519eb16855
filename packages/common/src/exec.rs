//! Contract with the execution service: what gets enqueued and the ordered
//! progress events that come back for each execution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Runtime data of one program run inside the sandbox.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunData {
    pub stdout: String,
    pub stderr: String,
    /// User-mode CPU time in milliseconds.
    pub cpu_ms: i64,
    pub wall_ms: i64,
    /// Resident set size in kibibytes.
    pub mem_kib: i64,
    pub exit_code: i64,
    /// Terminating signal, if any.
    pub signal: Option<i64>,
}

/// Progress event emitted by the execution service.
///
/// Events for one execution arrive strictly ordered; the stream closes
/// after a terminal event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecEvent {
    ReceivedSubmission,
    StartedCompiling,
    StartedTesting,
    FinishedTesting,
    CompilationError {
        message: Option<String>,
    },
    InternalServerError {
        message: Option<String>,
    },
    ReachedTest {
        test_id: u32,
    },
    IgnoredTest {
        test_id: u32,
    },
    FinishedTest {
        test_id: u32,
        submission: Option<RunData>,
        checker: Option<RunData>,
    },
}

impl ExecEvent {
    /// Terminal events end the event stream of an execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FinishedTesting | Self::CompilationError { .. } | Self::InternalServerError { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReceivedSubmission => "received_submission",
            Self::StartedCompiling => "started_compiling",
            Self::StartedTesting => "started_testing",
            Self::FinishedTesting => "finished_testing",
            Self::CompilationError { .. } => "compilation_error",
            Self::InternalServerError { .. } => "internal_server_error",
            Self::ReachedTest { .. } => "reached_test",
            Self::IgnoredTest { .. } => "ignored_test",
            Self::FinishedTest { .. } => "finished_test",
        }
    }
}

/// Test files for the tester, addressed by hash so it can cache them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTestFile {
    pub input_sha256: String,
    pub input_url: String,
    pub answer_sha256: String,
    pub answer_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecLimits {
    pub cpu_ms: i32,
    pub mem_kib: i32,
}

/// A unit of work for the execution service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Evaluation this execution grades.
    pub eval_uuid: Uuid,
    pub source_code: String,
    pub language_id: String,
    pub tests: Vec<ExecTestFile>,
    pub limits: ExecLimits,
    pub checker: Option<String>,
    pub interactor: Option<String>,
}
