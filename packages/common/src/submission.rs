use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A solution submitted by a user for a task.
///
/// `curr_eval_uuid` always points at the latest evaluation. Reevaluation
/// creates a new evaluation and repoints it; old evaluations are never
/// mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub uuid: Uuid,
    pub content: String,
    pub author_uuid: Uuid,
    pub task_short_id: String,
    pub lang_short_id: String,
    pub curr_eval_uuid: Uuid,
    pub created_at: DateTime<Utc>,
}
