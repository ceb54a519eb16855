//! Scoring of evaluations: received/possible points, the colored progress
//! bar and resource usage maxima.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluation::{Evaluation, ScoreUnit};
use crate::submission::Submission;

/// Percentages of the progress bar. The five parts sum to exactly 100,
/// or are all zero when there is nothing to score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBar {
    /// Accepted.
    pub green: i32,
    /// Failed.
    pub red: i32,
    /// Not reached yet.
    pub gray: i32,
    /// Reached but not classified yet.
    pub yellow: i32,
    /// Evaluation error.
    pub purple: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreInfo {
    pub score_bar: ScoreBar,
    pub received_score: i32,
    pub possible_score: i32,
    /// Largest CPU time over tests reporting one, clamped to the limit.
    pub max_cpu_ms: i32,
    /// Largest memory over tests reporting one, clamped to the limit.
    pub max_mem_kib: i32,
    pub exceeded_cpu: bool,
    pub exceeded_mem: bool,
}

impl ScoreInfo {
    pub fn is_full(&self) -> bool {
        self.possible_score > 0 && self.received_score == self.possible_score
    }
}

/// Highest received score of an author on one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestScore {
    pub subm_uuid: Uuid,
    pub received: i32,
    pub possible: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tally {
    green: i64,
    red: i64,
    gray: i64,
    yellow: i64,
    received: i32,
}

impl Tally {
    /// All-or-nothing classification of a set of tests worth `points`.
    fn add_unit(&mut self, eval: &Evaluation, test_ids: &[u32], points: i32) {
        let tests: Vec<_> = test_ids.iter().filter_map(|&id| eval.test(id)).collect();
        let p = i64::from(points);

        if !tests.iter().any(|t| t.reached) {
            self.gray += p;
        } else if tests.iter().all(|t| t.is_accepted()) {
            self.green += p;
            self.received += points;
        } else if tests.iter().any(|t| t.is_failed()) {
            self.red += p;
        } else {
            self.yellow += p;
        }
    }

    fn bar(&self) -> ScoreBar {
        normalize(self.green, self.red, self.gray, self.yellow, 0)
    }
}

/// Scale raw category sums to percentages. Every category but gray is
/// rounded half-up on its own; gray takes the residual.
fn normalize(green: i64, red: i64, gray: i64, yellow: i64, purple: i64) -> ScoreBar {
    let total = green + red + gray + yellow + purple;
    if total <= 0 {
        return ScoreBar::default();
    }

    let pct = |cat: i64| (cat * 200 + total) / (2 * total);
    let mut parts = [pct(green), pct(red), pct(yellow), pct(purple)];

    let excess = parts.iter().sum::<i64>() - 100;
    if excess > 0 {
        // Gray must not go negative.
        if let Some(largest) = parts.iter_mut().max_by_key(|p| **p) {
            *largest -= excess;
        }
    }

    let [green, red, yellow, purple] = parts.map(|p| p as i32);
    ScoreBar {
        green,
        red,
        gray: 100 - green - red - yellow - purple,
        yellow,
        purple,
    }
}

fn possible_score(eval: &Evaluation) -> i32 {
    match eval.score_unit {
        ScoreUnit::Test => eval.tests.len() as i32,
        ScoreUnit::TestGroup => eval.groups.iter().map(|g| g.points).sum(),
        ScoreUnit::Subtask => eval.subtasks.iter().map(|s| s.points).sum(),
    }
}

impl Evaluation {
    pub fn score(&self) -> ScoreInfo {
        let possible_score = possible_score(self);
        let (max_cpu_ms, exceeded_cpu) =
            clamped_max(self.tests.iter().filter_map(|t| t.cpu_ms), self.cpu_lim_ms);
        let (max_mem_kib, exceeded_mem) =
            clamped_max(self.tests.iter().filter_map(|t| t.mem_kib), self.mem_lim_kib);

        if self.error.is_some() {
            return ScoreInfo {
                score_bar: normalize(0, 0, 0, 0, 100),
                received_score: 0,
                possible_score,
                max_cpu_ms,
                max_mem_kib,
                exceeded_cpu,
                exceeded_mem,
            };
        }

        let mut tally = Tally::default();
        match self.score_unit {
            ScoreUnit::Test => {
                for test in &self.tests {
                    if test.is_accepted() {
                        tally.green += 1;
                        tally.received += 1;
                    } else if test.is_failed() {
                        tally.red += 1;
                    } else if test.reached {
                        tally.yellow += 1;
                    } else {
                        tally.gray += 1;
                    }
                }
            }
            ScoreUnit::TestGroup => {
                for group in &self.groups {
                    tally.add_unit(self, &group.test_ids, group.points);
                }
            }
            ScoreUnit::Subtask => {
                for subtask in &self.subtasks {
                    tally.add_unit(self, &subtask.test_ids, subtask.points);
                }
            }
        }

        ScoreInfo {
            score_bar: tally.bar(),
            received_score: tally.received,
            possible_score,
            max_cpu_ms,
            max_mem_kib,
            exceeded_cpu,
            exceeded_mem,
        }
    }
}

fn clamped_max(values: impl Iterator<Item = i32>, limit: i32) -> (i32, bool) {
    let max = values.max().unwrap_or(0).max(0);
    if max > limit {
        (limit, true)
    } else {
        (max, false)
    }
}

/// Best submission per task: highest received score, ties going to the
/// earliest submission.
pub fn best_scores_by_task<'a, I>(entries: I) -> HashMap<String, BestScore>
where
    I: IntoIterator<Item = (&'a Submission, &'a Evaluation)>,
{
    let mut best: HashMap<String, BestScore> = HashMap::new();

    for (subm, eval) in entries {
        let info = eval.score();
        let candidate = BestScore {
            subm_uuid: subm.uuid,
            received: info.received_score,
            possible: info.possible_score,
            created_at: subm.created_at,
        };

        best.entry(subm.task_short_id.clone())
            .and_modify(|current| {
                if candidate.received > current.received
                    || (candidate.received == current.received
                        && candidate.created_at < current.created_at)
                {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    best
}
