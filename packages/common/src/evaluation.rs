#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ParseEnumError;
use crate::task::Task;
use crate::verdict::Verdict;

/// Coarse lifecycle phase of an evaluation.
///
/// Stages only move forward: `Waiting -> Compiling -> Testing -> Finished`,
/// with a direct jump to `Finished` on compilation or internal failure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum EvalStage {
    #[default]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "waiting"))]
    Waiting,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "compiling"))]
    Compiling,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "testing"))]
    Testing,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "finished"))]
    Finished,
}

impl EvalStage {
    pub const ALL: &'static [EvalStage] = &[
        Self::Waiting,
        Self::Compiling,
        Self::Testing,
        Self::Finished,
    ];

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Compiling => "compiling",
            Self::Testing => "testing",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for EvalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalStage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("evaluation stage", s))
    }
}

/// Granularity at which points are aggregated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum ScoreUnit {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "test"))]
    Test,
    #[serde(rename = "group")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "group"))]
    TestGroup,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "subtask"))]
    Subtask,
}

impl ScoreUnit {
    pub const ALL: &'static [ScoreUnit] = &[Self::Test, Self::TestGroup, Self::Subtask];

    /// Subtasks take precedence over test groups, test groups over the
    /// plain test list.
    pub fn for_task(task: &Task) -> Self {
        if !task.subtasks.is_empty() {
            Self::Subtask
        } else if !task.test_groups.is_empty() {
            Self::TestGroup
        } else {
            Self::Test
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::TestGroup => "group",
            Self::Subtask => "subtask",
        }
    }
}

impl fmt::Display for ScoreUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreUnit {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("score unit", s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum EvalErrorKind {
    /// The submission failed to compile.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "compilation"))]
    Compilation,
    /// The execution pipeline failed or gave up on the evaluation.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "internal"))]
    Internal,
}

impl EvalErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compilation => "compilation",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalErrorKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compilation" => Ok(Self::Compilation),
            "internal" => Ok(Self::Internal),
            _ => Err(ParseEnumError::new("evaluation error type", s)),
        }
    }
}

/// Failure recorded inside a terminal evaluation. Not a call failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: Option<String>,
}

/// Grading state of one task test within an evaluation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub verdict: Option<Verdict>,
    /// Skipped by the tester, e.g. because another test of its group failed.
    pub ignored: bool,
    pub reached: bool,
    pub finished: bool,
    pub input_sha256: String,
    pub answer_sha256: String,
    pub cpu_ms: Option<i32>,
    pub mem_kib: Option<i32>,
}

impl Test {
    pub fn is_accepted(&self) -> bool {
        self.verdict == Some(Verdict::Ac)
    }

    pub fn is_failed(&self) -> bool {
        self.verdict.is_some_and(|v| v.is_failure())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub points: i32,
    pub description: String,
    /// 1-based ids into `Evaluation::tests`.
    pub test_ids: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGroup {
    pub points: i32,
    /// Statement-facing subtasks this group belongs to.
    pub subtask_ids: Vec<u32>,
    /// 1-based ids into `Evaluation::tests`.
    pub test_ids: Vec<u32>,
}

/// One grading attempt of a submission against a task's tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub uuid: Uuid,
    pub subm_uuid: Uuid,
    pub stage: EvalStage,
    pub score_unit: ScoreUnit,
    pub error: Option<EvalError>,
    pub subtasks: Vec<Subtask>,
    pub groups: Vec<TestGroup>,
    /// Ordered by task test id: `tests[id - 1]`.
    pub tests: Vec<Test>,
    pub checker: Option<String>,
    pub interactor: Option<String>,
    pub cpu_lim_ms: i32,
    pub mem_lim_kib: i32,
    pub created_at: DateTime<Utc>,
}

impl Evaluation {
    /// Build a fresh `Waiting` evaluation with one untouched test entry per
    /// task test.
    pub fn new(uuid: Uuid, subm_uuid: Uuid, task: &Task) -> Self {
        let subtasks = task
            .subtasks
            .iter()
            .map(|st| Subtask {
                points: st.points,
                description: st.description.clone(),
                test_ids: st.test_ids.clone(),
            })
            .collect();

        let groups = task
            .test_groups
            .iter()
            .enumerate()
            .map(|(i, tg)| TestGroup {
                points: tg.points,
                subtask_ids: task.test_group_subtasks(i + 1),
                test_ids: tg.test_ids.clone(),
            })
            .collect();

        let tests = task
            .tests
            .iter()
            .map(|t| Test {
                input_sha256: t.input_sha256.clone(),
                answer_sha256: t.answer_sha256.clone(),
                ..Default::default()
            })
            .collect();

        Self {
            uuid,
            subm_uuid,
            stage: EvalStage::Waiting,
            score_unit: ScoreUnit::for_task(task),
            error: None,
            subtasks,
            groups,
            tests,
            checker: task.checker.clone(),
            interactor: task.interactor.clone(),
            cpu_lim_ms: task.cpu_millis(),
            mem_lim_kib: task.memory_kib(),
            created_at: Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_finished()
    }

    /// Test by 1-based id.
    pub fn test(&self, id: u32) -> Option<&Test> {
        (id as usize).checked_sub(1).and_then(|i| self.tests.get(i))
    }

    /// Mutable test by 1-based id.
    pub fn test_mut(&mut self, id: u32) -> Option<&mut Test> {
        (id as usize)
            .checked_sub(1)
            .and_then(|i| self.tests.get_mut(i))
    }

    pub fn finished_tests(&self) -> usize {
        self.tests.iter().filter(|t| t.finished).count()
    }

    /// Move straight to `Finished` with the given error.
    pub fn fail(&mut self, kind: EvalErrorKind, message: Option<String>) {
        self.stage = EvalStage::Finished;
        self.error = Some(EvalError { kind, message });
    }
}
