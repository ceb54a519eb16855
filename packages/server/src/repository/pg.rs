use async_trait::async_trait;
use common::{EvalError, Evaluation, Submission, Subtask, Test, TestGroup};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use super::Repository;
use crate::entity::{
    evaluation, evaluation_subtask, evaluation_test, evaluation_test_group, submission,
};
use crate::error::RepoError;

/// Postgres-backed repository.
#[derive(Clone)]
pub struct PgRepository {
    db: DatabaseConnection,
}

impl PgRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn submission_from_model(m: submission::Model) -> Submission {
    Submission {
        uuid: m.uuid,
        content: m.content,
        author_uuid: m.author_uuid,
        task_short_id: m.task_short_id,
        lang_short_id: m.lang_short_id,
        curr_eval_uuid: m.curr_eval_uuid,
        created_at: m.created_at,
    }
}

fn ids_to_json(ids: &[u32]) -> serde_json::Value {
    serde_json::Value::from(ids.to_vec())
}

fn ids_from_json(eval_uuid: Uuid, value: serde_json::Value) -> Result<Vec<u32>, RepoError> {
    serde_json::from_value(value).map_err(|e| RepoError::corrupt("evaluation", eval_uuid, e))
}

#[async_trait]
impl Repository for PgRepository {
    async fn store_submission(&self, subm: &Submission) -> Result<(), RepoError> {
        let model = submission::ActiveModel {
            uuid: Set(subm.uuid),
            content: Set(subm.content.clone()),
            author_uuid: Set(subm.author_uuid),
            task_short_id: Set(subm.task_short_id.clone()),
            lang_short_id: Set(subm.lang_short_id.clone()),
            curr_eval_uuid: Set(subm.curr_eval_uuid),
            created_at: Set(subm.created_at),
            ..Default::default()
        };

        submission::Entity::insert(model)
            .on_conflict(
                OnConflict::column(submission::Column::Uuid)
                    .update_columns([
                        submission::Column::Content,
                        submission::Column::AuthorUuid,
                        submission::Column::TaskShortId,
                        submission::Column::LangShortId,
                        submission::Column::CurrEvalUuid,
                        submission::Column::CreatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn assign_evaluation(&self, subm_uuid: Uuid, eval_uuid: Uuid) -> Result<(), RepoError> {
        let result = submission::Entity::update_many()
            .col_expr(submission::Column::CurrEvalUuid, Expr::value(eval_uuid))
            .filter(submission::Column::Uuid.eq(subm_uuid))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepoError::NotFound {
                entity: "submission",
                id: subm_uuid,
            });
        }
        Ok(())
    }

    async fn get_submission(&self, uuid: Uuid) -> Result<Option<Submission>, RepoError> {
        let model = submission::Entity::find_by_id(uuid).one(&self.db).await?;
        Ok(model.map(submission_from_model))
    }

    async fn list_submissions(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Submission>, RepoError> {
        let models = submission::Entity::find()
            .order_by_desc(submission::Column::CreatedAt)
            .order_by_desc(submission::Column::Uuid)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(submission_from_model).collect())
    }

    async fn list_author_submissions(
        &self,
        author_uuid: Uuid,
    ) -> Result<Vec<Submission>, RepoError> {
        let models = submission::Entity::find()
            .filter(submission::Column::AuthorUuid.eq(author_uuid))
            .order_by_desc(submission::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(submission_from_model).collect())
    }

    async fn store_evaluation(&self, eval: &Evaluation) -> Result<(), RepoError> {
        let txn = self.db.begin().await?;

        let (error_kind, error_message) = match &eval.error {
            Some(err) => (Some(err.kind), err.message.clone()),
            None => (None, None),
        };

        let parent = evaluation::ActiveModel {
            uuid: Set(eval.uuid),
            subm_uuid: Set(eval.subm_uuid),
            stage: Set(eval.stage),
            score_unit: Set(eval.score_unit),
            error_kind: Set(error_kind),
            error_message: Set(error_message),
            checker: Set(eval.checker.clone()),
            interactor: Set(eval.interactor.clone()),
            cpu_lim_ms: Set(eval.cpu_lim_ms),
            mem_lim_kib: Set(eval.mem_lim_kib),
            created_at: Set(eval.created_at),
            ..Default::default()
        };

        evaluation::Entity::insert(parent)
            .on_conflict(
                OnConflict::column(evaluation::Column::Uuid)
                    .update_columns([
                        evaluation::Column::SubmUuid,
                        evaluation::Column::Stage,
                        evaluation::Column::ScoreUnit,
                        evaluation::Column::ErrorKind,
                        evaluation::Column::ErrorMessage,
                        evaluation::Column::Checker,
                        evaluation::Column::Interactor,
                        evaluation::Column::CpuLimMs,
                        evaluation::Column::MemLimKib,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        evaluation_subtask::Entity::delete_many()
            .filter(evaluation_subtask::Column::EvalUuid.eq(eval.uuid))
            .exec(&txn)
            .await?;
        evaluation_test_group::Entity::delete_many()
            .filter(evaluation_test_group::Column::EvalUuid.eq(eval.uuid))
            .exec(&txn)
            .await?;
        evaluation_test::Entity::delete_many()
            .filter(evaluation_test::Column::EvalUuid.eq(eval.uuid))
            .exec(&txn)
            .await?;

        if !eval.subtasks.is_empty() {
            let rows = eval
                .subtasks
                .iter()
                .enumerate()
                .map(|(pos, st)| evaluation_subtask::ActiveModel {
                    eval_uuid: Set(eval.uuid),
                    position: Set(pos as i32),
                    points: Set(st.points),
                    description: Set(st.description.clone()),
                    test_ids: Set(ids_to_json(&st.test_ids)),
                    ..Default::default()
                });
            evaluation_subtask::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        if !eval.groups.is_empty() {
            let rows = eval
                .groups
                .iter()
                .enumerate()
                .map(|(pos, g)| evaluation_test_group::ActiveModel {
                    eval_uuid: Set(eval.uuid),
                    position: Set(pos as i32),
                    points: Set(g.points),
                    subtask_ids: Set(ids_to_json(&g.subtask_ids)),
                    test_ids: Set(ids_to_json(&g.test_ids)),
                    ..Default::default()
                });
            evaluation_test_group::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        if !eval.tests.is_empty() {
            let rows = eval
                .tests
                .iter()
                .enumerate()
                .map(|(idx, t)| evaluation_test::ActiveModel {
                    eval_uuid: Set(eval.uuid),
                    test_id: Set(idx as i32 + 1),
                    verdict: Set(t.verdict),
                    ignored: Set(t.ignored),
                    reached: Set(t.reached),
                    finished: Set(t.finished),
                    input_sha256: Set(t.input_sha256.clone()),
                    answer_sha256: Set(t.answer_sha256.clone()),
                    cpu_ms: Set(t.cpu_ms),
                    mem_kib: Set(t.mem_kib),
                    ..Default::default()
                });
            evaluation_test::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        debug!(
            eval_uuid = %eval.uuid,
            stage = %eval.stage,
            tests = eval.tests.len(),
            "Stored evaluation"
        );

        Ok(())
    }

    async fn get_evaluation(&self, uuid: Uuid) -> Result<Option<Evaluation>, RepoError> {
        let Some(parent) = evaluation::Entity::find_by_id(uuid).one(&self.db).await? else {
            return Ok(None);
        };

        let subtask_rows = evaluation_subtask::Entity::find()
            .filter(evaluation_subtask::Column::EvalUuid.eq(uuid))
            .order_by_asc(evaluation_subtask::Column::Position)
            .all(&self.db)
            .await?;
        let group_rows = evaluation_test_group::Entity::find()
            .filter(evaluation_test_group::Column::EvalUuid.eq(uuid))
            .order_by_asc(evaluation_test_group::Column::Position)
            .all(&self.db)
            .await?;
        let test_rows = evaluation_test::Entity::find()
            .filter(evaluation_test::Column::EvalUuid.eq(uuid))
            .order_by_asc(evaluation_test::Column::TestId)
            .all(&self.db)
            .await?;

        let subtasks = subtask_rows
            .into_iter()
            .map(|row| {
                Ok(Subtask {
                    points: row.points,
                    description: row.description,
                    test_ids: ids_from_json(uuid, row.test_ids)?,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        let groups = group_rows
            .into_iter()
            .map(|row| {
                Ok(TestGroup {
                    points: row.points,
                    subtask_ids: ids_from_json(uuid, row.subtask_ids)?,
                    test_ids: ids_from_json(uuid, row.test_ids)?,
                })
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        let mut tests = Vec::with_capacity(test_rows.len());
        for (idx, row) in test_rows.into_iter().enumerate() {
            if row.test_id != idx as i32 + 1 {
                return Err(RepoError::corrupt(
                    "evaluation",
                    uuid,
                    format!("expected test {}, found {}", idx + 1, row.test_id),
                ));
            }
            tests.push(Test {
                verdict: row.verdict,
                ignored: row.ignored,
                reached: row.reached,
                finished: row.finished,
                input_sha256: row.input_sha256,
                answer_sha256: row.answer_sha256,
                cpu_ms: row.cpu_ms,
                mem_kib: row.mem_kib,
            });
        }

        let error = parent.error_kind.map(|kind| EvalError {
            kind,
            message: parent.error_message.clone(),
        });

        Ok(Some(Evaluation {
            uuid: parent.uuid,
            subm_uuid: parent.subm_uuid,
            stage: parent.stage,
            score_unit: parent.score_unit,
            error,
            subtasks,
            groups,
            tests,
            checker: parent.checker,
            interactor: parent.interactor,
            cpu_lim_ms: parent.cpu_lim_ms,
            mem_lim_kib: parent.mem_lim_kib,
            created_at: parent.created_at,
        }))
    }
}
