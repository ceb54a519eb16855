use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use common::{Evaluation, Submission};
use uuid::Uuid;

use super::Repository;
use crate::error::RepoError;

/// Process-local repository, used by tests and single-node setups without a
/// database.
#[derive(Default)]
pub struct MemoryRepository {
    submissions: Mutex<HashMap<Uuid, Submission>>,
    evaluations: Mutex<HashMap<Uuid, Evaluation>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut subms: Vec<Submission>) -> Vec<Submission> {
    subms.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.uuid.cmp(&a.uuid))
    });
    subms
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn store_submission(&self, subm: &Submission) -> Result<(), RepoError> {
        let mut subms = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        subms.insert(subm.uuid, subm.clone());
        Ok(())
    }

    async fn assign_evaluation(&self, subm_uuid: Uuid, eval_uuid: Uuid) -> Result<(), RepoError> {
        let mut subms = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        let subm = subms.get_mut(&subm_uuid).ok_or(RepoError::NotFound {
            entity: "submission",
            id: subm_uuid,
        })?;
        subm.curr_eval_uuid = eval_uuid;
        Ok(())
    }

    async fn get_submission(&self, uuid: Uuid) -> Result<Option<Submission>, RepoError> {
        let subms = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(subms.get(&uuid).cloned())
    }

    async fn list_submissions(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Submission>, RepoError> {
        let all: Vec<_> = {
            let subms = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
            subms.values().cloned().collect()
        };
        Ok(newest_first(all)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_author_submissions(
        &self,
        author_uuid: Uuid,
    ) -> Result<Vec<Submission>, RepoError> {
        let mine: Vec<_> = {
            let subms = self.submissions.lock().unwrap_or_else(|e| e.into_inner());
            subms
                .values()
                .filter(|s| s.author_uuid == author_uuid)
                .cloned()
                .collect()
        };
        Ok(newest_first(mine))
    }

    async fn store_evaluation(&self, eval: &Evaluation) -> Result<(), RepoError> {
        let mut evals = self.evaluations.lock().unwrap_or_else(|e| e.into_inner());
        evals.insert(eval.uuid, eval.clone());
        Ok(())
    }

    async fn get_evaluation(&self, uuid: Uuid) -> Result<Option<Evaluation>, RepoError> {
        let evals = self.evaluations.lock().unwrap_or_else(|e| e.into_inner());
        Ok(evals.get(&uuid).cloned())
    }
}
