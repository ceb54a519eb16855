use chrono::{TimeZone, Utc};
use common::{EvalErrorKind, EvalStage, Evaluation, Submission, Verdict};
use grader::{RepoError, Repository};
use uuid::Uuid;

use crate::harness::grouped_task;
use crate::harness::pg::test_repo;

/// Postgres keeps microseconds, so fixtures use whole seconds.
fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn evaluation(subm_uuid: Uuid) -> Evaluation {
    let mut eval = Evaluation::new(Uuid::now_v7(), subm_uuid, &grouped_task("groups"));
    eval.created_at = at(0);
    eval
}

fn submission(author: Uuid, eval_uuid: Uuid, secs: i64) -> Submission {
    Submission {
        uuid: Uuid::now_v7(),
        content: "int main() {}".into(),
        author_uuid: author,
        task_short_id: "groups".into(),
        lang_short_id: "cpp17".into(),
        curr_eval_uuid: eval_uuid,
        created_at: at(secs),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn evaluation_round_trips_with_children() {
    let repo = test_repo().await;
    let mut eval = evaluation(Uuid::now_v7());
    eval.stage = EvalStage::Finished;
    {
        let t = eval.test_mut(1).unwrap();
        t.reached = true;
        t.finished = true;
        t.verdict = Some(Verdict::Ac);
        t.cpu_ms = Some(15);
        t.mem_kib = Some(2048);
    }
    eval.test_mut(2).unwrap().ignored = true;

    repo.store_evaluation(&eval).await.unwrap();
    let loaded = repo.get_evaluation(eval.uuid).await.unwrap().unwrap();

    assert_eq!(loaded, eval);
    assert_eq!(loaded.groups.len(), 2);
    assert_eq!(loaded.subtasks.len(), 1);
    assert_eq!(loaded.tests.len(), 4);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn storing_again_replaces_previous_copy() {
    let repo = test_repo().await;
    let mut eval = evaluation(Uuid::now_v7());
    repo.store_evaluation(&eval).await.unwrap();

    eval.fail(EvalErrorKind::Internal, Some("evaluation timed out".into()));
    repo.store_evaluation(&eval).await.unwrap();
    repo.store_evaluation(&eval).await.unwrap();

    let loaded = repo.get_evaluation(eval.uuid).await.unwrap().unwrap();
    assert_eq!(loaded.stage, EvalStage::Finished);
    assert_eq!(loaded.error, eval.error);
    assert_eq!(loaded.tests.len(), 4);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn missing_evaluation_is_none() {
    let repo = test_repo().await;
    assert!(repo.get_evaluation(Uuid::now_v7()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn submissions_are_listed_newest_first() {
    let repo = test_repo().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let old = submission(alice, Uuid::now_v7(), 0);
    let new = submission(alice, Uuid::now_v7(), 10);
    let other = submission(bob, Uuid::now_v7(), 5);
    for s in [&old, &new, &other] {
        repo.store_submission(s).await.unwrap();
    }

    let all = repo.list_submissions(10, 0).await.unwrap();
    let order: Vec<_> = all.iter().map(|s| s.uuid).collect();
    assert_eq!(order, vec![new.uuid, other.uuid, old.uuid]);

    let page = repo.list_submissions(1, 1).await.unwrap();
    assert_eq!(page[0].uuid, other.uuid);

    let mine = repo.list_author_submissions(alice).await.unwrap();
    assert_eq!(mine, vec![new.clone(), old.clone()]);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn assign_evaluation_updates_submission() {
    let repo = test_repo().await;
    let subm = submission(Uuid::new_v4(), Uuid::now_v7(), 0);
    repo.store_submission(&subm).await.unwrap();

    let next = Uuid::now_v7();
    repo.assign_evaluation(subm.uuid, next).await.unwrap();
    let loaded = repo.get_submission(subm.uuid).await.unwrap().unwrap();
    assert_eq!(loaded.curr_eval_uuid, next);

    let err = repo
        .assign_evaluation(Uuid::now_v7(), next)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "submission", .. }));
}
