use std::time::Duration;

use serde::Deserialize;

/// Floor for periods and deadlines that must never be zero.
const MIN_PERIOD_SECS: u64 = 1;

/// Grading pipeline configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct GradingConfig {
    /// Largest accepted source code, in bytes. Default: 65536.
    #[serde(default = "default_max_submission_bytes")]
    pub max_submission_bytes: usize,
    /// Minimum seconds between two accepted submissions of one author. Default: 10.
    #[serde(default = "default_submission_cooldown_secs")]
    pub submission_cooldown_secs: u64,
    /// Deadline for persisting a finished evaluation. Default: 10.
    #[serde(default = "default_finalize_timeout_secs")]
    pub finalize_timeout_secs: u64,
    /// Longest silence tolerated between two execution events. Default: 300.
    #[serde(default = "default_event_idle_timeout_secs")]
    pub event_idle_timeout_secs: u64,
    /// Age since last update after which a live evaluation is reaped. Default: 900.
    #[serde(default = "default_stuck_evaluation_timeout_secs")]
    pub stuck_evaluation_timeout_secs: u64,
    /// How often the reaper scans the live cache. Default: 60.
    #[serde(default = "default_stuck_scan_interval_secs")]
    pub stuck_scan_interval_secs: u64,
    /// Buffer of each submission-list subscriber. Default: 100.
    #[serde(default = "default_list_update_buffer")]
    pub list_update_buffer: usize,
    /// Buffer of each new-submission subscriber. Default: 10.
    #[serde(default = "default_new_submission_buffer")]
    pub new_submission_buffer: usize,
}

fn default_max_submission_bytes() -> usize {
    64 * 1024
}
fn default_submission_cooldown_secs() -> u64 {
    10
}
fn default_finalize_timeout_secs() -> u64 {
    10
}
fn default_event_idle_timeout_secs() -> u64 {
    300
}
fn default_stuck_evaluation_timeout_secs() -> u64 {
    900
}
fn default_stuck_scan_interval_secs() -> u64 {
    60
}
fn default_list_update_buffer() -> usize {
    100
}
fn default_new_submission_buffer() -> usize {
    10
}

impl GradingConfig {
    pub fn submission_cooldown(&self) -> Duration {
        Duration::from_secs(self.submission_cooldown_secs)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_secs(self.finalize_timeout_secs.max(MIN_PERIOD_SECS))
    }

    pub fn event_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.event_idle_timeout_secs.max(MIN_PERIOD_SECS))
    }

    pub fn stuck_evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.stuck_evaluation_timeout_secs)
    }

    pub fn stuck_scan_interval(&self) -> Duration {
        Duration::from_secs(self.stuck_scan_interval_secs.max(MIN_PERIOD_SECS))
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            max_submission_bytes: default_max_submission_bytes(),
            submission_cooldown_secs: default_submission_cooldown_secs(),
            finalize_timeout_secs: default_finalize_timeout_secs(),
            event_idle_timeout_secs: default_event_idle_timeout_secs(),
            stuck_evaluation_timeout_secs: default_stuck_evaluation_timeout_secs(),
            stuck_scan_interval_secs: default_stuck_scan_interval_secs(),
            list_update_buffer: default_list_update_buffer(),
            new_submission_buffer: default_new_submission_buffer(),
        }
    }
}
