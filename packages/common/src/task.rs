use serde::{Deserialize, Serialize};

/// Kibibytes in one megabyte (10^6 bytes / 1024).
const KIB_PER_MEGABYTE: f64 = 976.5625;

/// Input/answer pair of a task test, addressed by content hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTest {
    pub input_sha256: String,
    pub answer_sha256: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubtask {
    pub points: i32,
    pub description: String,
    /// 1-based test ids.
    pub test_ids: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTestGroup {
    pub points: i32,
    /// 1-based test ids.
    pub test_ids: Vec<u32>,
}

/// Task as served by the task service: everything grading needs to know
/// about a task, nothing about its statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub short_id: String,
    pub tests: Vec<TaskTest>,
    #[serde(default)]
    pub subtasks: Vec<TaskSubtask>,
    #[serde(default)]
    pub test_groups: Vec<TaskTestGroup>,
    pub checker: Option<String>,
    pub interactor: Option<String>,
    pub cpu_time_limit_seconds: f64,
    pub memory_limit_megabytes: u32,
}

impl Task {
    pub fn cpu_millis(&self) -> i32 {
        (self.cpu_time_limit_seconds * 1000.0) as i32
    }

    pub fn memory_kib(&self) -> i32 {
        (f64::from(self.memory_limit_megabytes) * KIB_PER_MEGABYTE) as i32
    }

    /// 1-based ids of the subtasks sharing at least one test with the given
    /// 1-based test group.
    pub fn test_group_subtasks(&self, group_id: usize) -> Vec<u32> {
        let Some(group) = group_id
            .checked_sub(1)
            .and_then(|idx| self.test_groups.get(idx))
        else {
            return Vec::new();
        };

        self.subtasks
            .iter()
            .enumerate()
            .filter(|(_, st)| st.test_ids.iter().any(|t| group.test_ids.contains(t)))
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }
}
