use std::sync::Arc;
use std::time::Duration;

use common::Evaluation;
use tracing::{debug, error, info};

use super::live::LiveCache;
use crate::error::RepoError;
use crate::repository::Repository;

/// Persists finished evaluations and evicts them from the live cache.
pub struct Finalizer {
    live: Arc<LiveCache>,
    repo: Arc<dyn Repository>,
    timeout: Duration,
}

impl Finalizer {
    pub fn new(live: Arc<LiveCache>, repo: Arc<dyn Repository>, timeout: Duration) -> Self {
        Self {
            live,
            repo,
            timeout,
        }
    }

    /// Claim and persist `eval`. Returns `None` if another task already
    /// claimed this evaluation.
    pub async fn finalize(&self, eval: &Evaluation) -> Option<Result<(), RepoError>> {
        if self.live.begin_finalize(eval.uuid).is_none() {
            debug!(eval_uuid = %eval.uuid, "Evaluation already being finalized, skipping");
            return None;
        }
        Some(self.persist_claimed(eval).await)
    }

    /// Persist an evaluation the caller has already claimed. The live entry
    /// is removed whatever the outcome; failures are not retried.
    pub async fn persist_claimed(&self, eval: &Evaluation) -> Result<(), RepoError> {
        let result = match tokio::time::timeout(self.timeout, self.repo.store_evaluation(eval)).await
        {
            Ok(res) => res,
            Err(_) => Err(RepoError::Timeout(self.timeout)),
        };
        self.live.remove(eval.uuid);

        match &result {
            Ok(()) => info!(
                eval_uuid = %eval.uuid,
                subm_uuid = %eval.subm_uuid,
                error = ?eval.error.as_ref().map(|e| e.kind),
                "Finalized evaluation"
            ),
            Err(e) => error!(
                eval_uuid = %eval.uuid,
                subm_uuid = %eval.subm_uuid,
                error = %e,
                evaluation = ?eval,
                "Failed to persist finished evaluation, it is lost"
            ),
        }
        result
    }
}
