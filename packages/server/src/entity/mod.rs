pub mod evaluation;
pub mod evaluation_subtask;
pub mod evaluation_test_group;
pub mod submission;
