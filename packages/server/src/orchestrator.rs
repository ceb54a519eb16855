//! Entry point of the grader: accepting submissions, starting their grading
//! and serving reads and subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    BestScore, EvalErrorKind, Evaluation, ExecEvent, ExecLimits, ExecRequest, ExecTestFile,
    GradingConfig, Submission, Task, language,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::broadcast::{Broadcaster, DeliveryPolicy, EvalUpdate, Subscription};
use crate::error::GradingError;
use crate::grading::{Finalizer, LiveCache, Pipeline, RateLimiter, run_consumer, run_reaper};
use crate::repository::Repository;
use crate::services::{ExecutionService, ServiceError, TaskService, UserService};

/// Services the orchestrator is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserService>,
    pub tasks: Arc<dyn TaskService>,
    pub execution: Arc<dyn ExecutionService>,
    pub repository: Arc<dyn Repository>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSubmission {
    pub author_uuid: Uuid,
    pub task_short_id: String,
    pub lang_short_id: String,
    pub content: String,
}

pub struct Orchestrator {
    users: Arc<dyn UserService>,
    tasks: Arc<dyn TaskService>,
    execution: Arc<dyn ExecutionService>,
    repo: Arc<dyn Repository>,
    config: GradingConfig,
    pipeline: Arc<Pipeline>,
    new_submissions: Broadcaster<Submission>,
    rate_limiter: RateLimiter,
    root: CancellationToken,
    tracker: TaskTracker,
}

fn user_error(uuid: Uuid, err: ServiceError) -> GradingError {
    match err {
        ServiceError::NotFound(_) => GradingError::UserNotFound(uuid.to_string()),
        other => GradingError::dependency("user", other),
    }
}

fn task_error(short_id: &str, err: ServiceError) -> GradingError {
    match err {
        ServiceError::NotFound(_) => GradingError::TaskNotFound(short_id.to_string()),
        other => GradingError::dependency("task", other),
    }
}

fn retry_after_secs(wait: Duration) -> u64 {
    wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
}

impl Orchestrator {
    /// Build the orchestrator and start its stuck evaluation reaper. Must
    /// be called inside a tokio runtime.
    pub fn new(collaborators: Collaborators, config: GradingConfig) -> Self {
        let live = Arc::new(LiveCache::new());
        let finalizer = Finalizer::new(
            live.clone(),
            collaborators.repository.clone(),
            config.finalize_timeout(),
        );
        let pipeline = Arc::new(Pipeline {
            live,
            finalizer,
            updates: Broadcaster::new(),
            config: config.clone(),
        });

        let root = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(run_reaper(pipeline.clone(), root.child_token()));

        Self {
            users: collaborators.users,
            tasks: collaborators.tasks,
            execution: collaborators.execution,
            repo: collaborators.repository,
            rate_limiter: RateLimiter::new(config.submission_cooldown()),
            config,
            pipeline,
            new_submissions: Broadcaster::new(),
            root,
            tracker,
        }
    }

    /// Accept a submission and start grading it.
    #[instrument(
        skip(self, req),
        fields(author = %req.author_uuid, task = %req.task_short_id, lang = %req.lang_short_id)
    )]
    pub async fn submit(&self, req: NewSubmission) -> Result<Submission, GradingError> {
        let result = self.try_submit(req).await;
        if let Err(e) = &result {
            warn!(code = e.code(), error = %e, "Submission rejected");
        }
        result
    }

    async fn try_submit(&self, req: NewSubmission) -> Result<Submission, GradingError> {
        let limit = self.config.max_submission_bytes;
        if req.content.len() > limit {
            return Err(GradingError::SubmissionTooLong {
                size: req.content.len(),
                limit,
            });
        }

        let user = self
            .users
            .get_user_by_uuid(req.author_uuid)
            .await
            .map_err(|e| user_error(req.author_uuid, e))?;

        let lang = language::find_enabled(&req.lang_short_id)
            .ok_or_else(|| GradingError::LanguageNotFound(req.lang_short_id.clone()))?;

        let task = self
            .tasks
            .get_task(&req.task_short_id)
            .await
            .map_err(|e| task_error(&req.task_short_id, e))?;

        let reservation =
            self.rate_limiter
                .reserve(&user.username)
                .map_err(|wait| GradingError::TooFrequent {
                    retry_after: retry_after_secs(wait),
                })?;

        let subm_uuid = Uuid::now_v7();
        let eval = Evaluation::new(Uuid::now_v7(), subm_uuid, &task);
        let subm = Submission {
            uuid: subm_uuid,
            content: req.content,
            author_uuid: user.uuid,
            task_short_id: task.short_id.clone(),
            lang_short_id: lang.id.to_string(),
            curr_eval_uuid: eval.uuid,
            created_at: Utc::now(),
        };

        self.repo.store_evaluation(&eval).await?;
        self.repo.store_submission(&subm).await?;
        reservation.commit();

        info!(
            subm_uuid = %subm.uuid,
            eval_uuid = %eval.uuid,
            username = %user.username,
            tests = eval.tests.len(),
            score_unit = %eval.score_unit,
            "Accepted submission"
        );

        self.new_submissions.publish(&subm);
        self.pipeline.publish(&eval);

        self.start_grading(&subm, eval, &task).await?;
        Ok(subm)
    }

    /// Grade an existing submission again under a new evaluation.
    #[instrument(skip(self))]
    pub async fn reevaluate(&self, subm_uuid: Uuid) -> Result<Evaluation, GradingError> {
        let mut subm = self
            .repo
            .get_submission(subm_uuid)
            .await?
            .ok_or(GradingError::SubmissionNotFound(subm_uuid))?;

        let task = self
            .tasks
            .get_task(&subm.task_short_id)
            .await
            .map_err(|e| task_error(&subm.task_short_id, e))?;

        let eval = Evaluation::new(Uuid::now_v7(), subm.uuid, &task);
        self.repo.store_evaluation(&eval).await?;
        self.repo.assign_evaluation(subm.uuid, eval.uuid).await?;
        subm.curr_eval_uuid = eval.uuid;

        info!(
            subm_uuid = %subm.uuid,
            eval_uuid = %eval.uuid,
            "Reevaluating submission"
        );

        self.pipeline.publish(&eval);
        self.start_grading(&subm, eval.clone(), &task).await?;
        Ok(eval)
    }

    /// Put the evaluation into the live cache, enqueue it and spawn its
    /// consumer. If the execution service cannot take it, the evaluation is
    /// finished as an internal error.
    async fn start_grading(
        &self,
        subm: &Submission,
        eval: Evaluation,
        task: &Task,
    ) -> Result<(), GradingError> {
        let cancel = self.root.child_token();
        self.pipeline.live.insert(eval.clone(), cancel.clone());

        match self.enqueue(subm, &eval, task).await {
            Ok(events) => {
                info!(eval_uuid = %eval.uuid, "Enqueued evaluation");
                self.tracker
                    .spawn(run_consumer(self.pipeline.clone(), eval, events, cancel));
                Ok(())
            }
            Err(e) => {
                error!(eval_uuid = %eval.uuid, error = %e, "Failed to enqueue evaluation");
                let mut eval = eval;
                eval.fail(
                    EvalErrorKind::Internal,
                    Some("failed to enqueue evaluation".to_string()),
                );
                if self.pipeline.live.update(&eval) {
                    self.pipeline.publish(&eval);
                    let _ = self.pipeline.finalizer.finalize(&eval).await;
                }
                Err(e)
            }
        }
    }

    async fn enqueue(
        &self,
        subm: &Submission,
        eval: &Evaluation,
        task: &Task,
    ) -> Result<mpsc::Receiver<ExecEvent>, GradingError> {
        let tests = try_join_all(task.tests.iter().map(|t| async move {
            let input_url = self.tasks.get_test_download_url(&t.input_sha256).await?;
            let answer_url = self.tasks.get_test_download_url(&t.answer_sha256).await?;
            Ok::<_, ServiceError>(ExecTestFile {
                input_sha256: t.input_sha256.clone(),
                input_url,
                answer_sha256: t.answer_sha256.clone(),
                answer_url,
            })
        }))
        .await
        .map_err(|e| GradingError::dependency("task", e))?;

        let request = ExecRequest {
            eval_uuid: eval.uuid,
            source_code: subm.content.clone(),
            language_id: subm.lang_short_id.clone(),
            tests,
            limits: ExecLimits {
                cpu_ms: eval.cpu_lim_ms,
                mem_kib: eval.mem_lim_kib,
            },
            checker: eval.checker.clone(),
            interactor: eval.interactor.clone(),
        };

        let exec_id = self
            .execution
            .enqueue(request)
            .await
            .map_err(|e| GradingError::dependency("execution", e))?;
        self.execution
            .listen(exec_id)
            .await
            .map_err(|e| GradingError::dependency("execution", e))
    }

    pub async fn get_submission(&self, uuid: Uuid) -> Result<Submission, GradingError> {
        self.repo
            .get_submission(uuid)
            .await?
            .ok_or(GradingError::SubmissionNotFound(uuid))
    }

    /// Newest first.
    pub async fn list_submissions(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Submission>, GradingError> {
        Ok(self.repo.list_submissions(limit, offset).await?)
    }

    /// Live state while grading, stored state afterwards.
    pub async fn get_evaluation(&self, uuid: Uuid) -> Result<Evaluation, GradingError> {
        if let Some(eval) = self.pipeline.live.get(uuid) {
            return Ok(eval);
        }
        self.repo
            .get_evaluation(uuid)
            .await?
            .ok_or(GradingError::EvaluationNotFound(uuid))
    }

    /// Latest evaluation snapshot of one submission. Intermediate snapshots
    /// may be skipped.
    pub fn subscribe_submission_updates(
        &self,
        subm_uuid: Uuid,
        cancel: &CancellationToken,
    ) -> Subscription<EvalUpdate> {
        self.pipeline
            .updates
            .subscribe(DeliveryPolicy::LatestValue, Some(subm_uuid), cancel)
    }

    /// Evaluation snapshots of every submission, for list views.
    pub fn subscribe_all_updates(&self, cancel: &CancellationToken) -> Subscription<EvalUpdate> {
        self.pipeline.updates.subscribe(
            DeliveryPolicy::BoundedFifo {
                capacity: self.config.list_update_buffer,
                coalesce_by_key: true,
            },
            None,
            cancel,
        )
    }

    pub fn subscribe_new_submissions(&self, cancel: &CancellationToken) -> Subscription<Submission> {
        self.new_submissions.subscribe(
            DeliveryPolicy::BoundedFifo {
                capacity: self.config.new_submission_buffer,
                coalesce_by_key: false,
            },
            None,
            cancel,
        )
    }

    /// Wait until the evaluation is finished. Every update of the
    /// evaluation restarts the idle timeout.
    pub async fn wait_for_evaluation(
        &self,
        eval_uuid: Uuid,
        idle_timeout: Duration,
    ) -> Result<Evaluation, GradingError> {
        let current = self.get_evaluation(eval_uuid).await?;
        if current.is_finished() {
            return Ok(current);
        }

        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let mut updates = self.subscribe_submission_updates(current.subm_uuid, &cancel);

        // It may have finished before the subscription existed.
        let current = self.get_evaluation(eval_uuid).await?;
        if current.is_finished() {
            return Ok(current);
        }

        let mut deadline = tokio::time::Instant::now() + idle_timeout;
        loop {
            match tokio::time::timeout_at(deadline, updates.recv()).await {
                // The latest-value mailbox may have dropped the terminal
                // snapshot in favour of a newer evaluation of the submission.
                Err(_) | Ok(None) => {
                    let eval = self.get_evaluation(eval_uuid).await?;
                    return if eval.is_finished() {
                        Ok(eval)
                    } else {
                        Err(GradingError::WaitTimeout(eval_uuid))
                    };
                }
                Ok(Some(update)) if update.evaluation.uuid == eval_uuid => {
                    if update.evaluation.is_finished() {
                        return Ok(update.evaluation);
                    }
                    deadline = tokio::time::Instant::now() + idle_timeout;
                }
                // Another evaluation of the same submission.
                Ok(Some(_)) => {}
            }
        }
    }

    /// Best submission of the author for every task they submitted to.
    pub async fn best_scores_by_task(
        &self,
        author_uuid: Uuid,
    ) -> Result<HashMap<String, BestScore>, GradingError> {
        let subms = self.repo.list_author_submissions(author_uuid).await?;

        let mut graded = Vec::with_capacity(subms.len());
        for subm in subms {
            match self.get_evaluation(subm.curr_eval_uuid).await {
                Ok(eval) => graded.push((subm, eval)),
                Err(GradingError::EvaluationNotFound(id)) => {
                    warn!(subm_uuid = %subm.uuid, eval_uuid = %id, "Submission has no evaluation");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(common::best_scores_by_task(
            graded.iter().map(|(s, e)| (s, e)),
        ))
    }

    /// Number of evaluations currently being graded.
    pub fn in_flight(&self) -> usize {
        self.pipeline.live.len()
    }

    /// Stop the reaper and every consumer, end all subscriptions and wait
    /// for the background tasks to exit. In-flight evaluations are left as
    /// last stored.
    pub async fn shutdown(&self) {
        info!(in_flight = self.in_flight(), "Shutting down grader");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.pipeline.updates.close();
        self.new_submissions.close();
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
