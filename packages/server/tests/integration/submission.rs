use std::sync::atomic::Ordering;

use common::{EvalErrorKind, EvalStage, ExecEvent, GradingConfig, ScoreUnit, Verdict};
use grader::{GradingError, Repository};

use crate::harness::{
    TestGrader, accepted, crashed, full_run, grouped_task, plain_task, wrong,
};

mod grading {
    use super::*;

    #[tokio::test]
    async fn all_tests_accepted_scores_full_green() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        app.exec
            .send_all(subm.curr_eval_uuid, full_run(vec![accepted(1), accepted(2)]))
            .await;
        let eval = app.wait(subm.curr_eval_uuid).await;

        assert_eq!(eval.stage, EvalStage::Finished);
        assert_eq!(eval.score_unit, ScoreUnit::Test);
        let score = eval.score();
        assert_eq!(score.received_score, 2);
        assert_eq!(score.possible_score, 2);
        assert_eq!(score.score_bar.green, 100);

        let stored = app
            .repo
            .get_evaluation(subm.curr_eval_uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, eval);
    }

    #[tokio::test]
    async fn runtime_error_on_one_test_scores_partial() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        app.exec
            .send_all(subm.curr_eval_uuid, full_run(vec![accepted(1), crashed(2)]))
            .await;
        let eval = app.wait(subm.curr_eval_uuid).await;

        assert_eq!(eval.tests[1].verdict, Some(Verdict::Re));
        let score = eval.score();
        assert_eq!(score.received_score, 1);
        assert_eq!(score.possible_score, 2);
        assert!(score.score_bar.red > 0);
    }

    #[tokio::test]
    async fn compilation_error_scores_purple() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        app.exec
            .send_all(
                subm.curr_eval_uuid,
                vec![
                    ExecEvent::ReceivedSubmission,
                    ExecEvent::StartedCompiling,
                    ExecEvent::CompilationError {
                        message: Some("syntax error".into()),
                    },
                ],
            )
            .await;
        let eval = app.wait(subm.curr_eval_uuid).await;

        assert_eq!(eval.stage, EvalStage::Finished);
        assert_eq!(eval.error.as_ref().unwrap().kind, EvalErrorKind::Compilation);
        assert_eq!(eval.score().score_bar.purple, 100);
    }

    #[tokio::test]
    async fn subtask_mode_is_all_or_nothing() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "groups"))
            .await
            .unwrap();

        app.exec
            .send_all(
                subm.curr_eval_uuid,
                full_run(vec![accepted(1), accepted(2), accepted(3), wrong(4)]),
            )
            .await;
        let eval = app.wait(subm.curr_eval_uuid).await;

        // Subtasks take precedence when a task has both.
        assert_eq!(eval.score_unit, ScoreUnit::Subtask);
        assert_eq!(eval.groups[1].subtask_ids, vec![1]);
        assert_eq!(eval.score().received_score, 0);
    }

    #[tokio::test]
    async fn group_scoring_without_subtasks() {
        let app = TestGrader::spawn();
        let mut task = grouped_task("groups-only");
        task.subtasks.clear();
        app.tasks.add(task);

        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "groups-only"))
            .await
            .unwrap();
        app.exec
            .send_all(
                subm.curr_eval_uuid,
                full_run(vec![accepted(1), accepted(2), accepted(3), wrong(4)]),
            )
            .await;
        let eval = app.wait(subm.curr_eval_uuid).await;

        assert_eq!(eval.score_unit, ScoreUnit::TestGroup);
        let score = eval.score();
        assert_eq!(score.received_score, 40);
        assert_eq!(score.possible_score, 100);
        assert_eq!(score.score_bar.green, 40);
        assert_eq!(score.score_bar.red, 60);
    }

    #[tokio::test]
    async fn out_of_range_events_are_ignored() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        let mut events = full_run(vec![accepted(1), accepted(2)]);
        events.insert(2, ExecEvent::ReachedTest { test_id: 0 });
        events.insert(3, accepted(7));
        app.exec.send_all(subm.curr_eval_uuid, events).await;
        let eval = app.wait(subm.curr_eval_uuid).await;

        assert_eq!(eval.tests.len(), 2);
        assert_eq!(eval.score().received_score, 2);
    }

    #[tokio::test]
    async fn reads_see_live_state_while_grading() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        let eval_uuid = subm.curr_eval_uuid;

        let mut updates = app.grader.subscribe_submission_updates(
            subm.uuid,
            &tokio_util::sync::CancellationToken::new(),
        );
        app.exec
            .send_all(
                eval_uuid,
                vec![
                    ExecEvent::StartedCompiling,
                    ExecEvent::StartedTesting,
                    ExecEvent::ReachedTest { test_id: 1 },
                ],
            )
            .await;
        loop {
            let update = updates.recv().await.unwrap();
            if update.evaluation.test(1).is_some_and(|t| t.reached) {
                break;
            }
        }

        let live = app.grader.get_evaluation(eval_uuid).await.unwrap();
        assert_eq!(live.stage, EvalStage::Testing);
        assert!(live.tests[0].reached);
        assert_eq!(live.score().score_bar.yellow, 50);

        // The repository still holds the initial copy.
        let stored = app.repo.get_evaluation(eval_uuid).await.unwrap().unwrap();
        assert_eq!(stored.stage, EvalStage::Waiting);
    }

    #[tokio::test]
    async fn enqueue_request_carries_task_details() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        let requests = app.exec.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.eval_uuid, subm.curr_eval_uuid);
        assert_eq!(req.language_id, "cpp17");
        assert_eq!(req.limits.cpu_ms, 1000);
        assert_eq!(req.limits.mem_kib, 250_000);
        assert_eq!(req.checker.as_deref(), Some("testlib-checker"));
        assert_eq!(req.tests.len(), 2);
        assert_eq!(req.tests[1].input_sha256, "sum-in-2");
        assert_eq!(req.tests[1].answer_url, "https://tests.example/sum-ans-2");
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn closed_event_stream_finishes_as_internal_error() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        let tx = app.exec.take_sender(subm.curr_eval_uuid);
        tx.send(ExecEvent::StartedCompiling).await.unwrap();
        drop(tx);

        let eval = app.wait(subm.curr_eval_uuid).await;
        assert_eq!(eval.error.as_ref().unwrap().kind, EvalErrorKind::Internal);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_execution_times_out() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        app.exec
            .send_all(subm.curr_eval_uuid, vec![ExecEvent::StartedCompiling])
            .await;

        // The clock auto-advances past the event idle timeout.
        let eval = app
            .grader
            .wait_for_evaluation(subm.curr_eval_uuid, std::time::Duration::from_secs(3600))
            .await
            .unwrap();
        let err = eval.error.unwrap();
        assert_eq!(err.kind, EvalErrorKind::Internal);
        assert_eq!(
            err.message.as_deref(),
            Some("execution service stopped responding")
        );
    }

    #[tokio::test]
    async fn enqueue_failure_finishes_evaluation_and_reports() {
        let app = TestGrader::spawn();
        app.exec.fail_enqueue.store(true, Ordering::SeqCst);

        let err = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GradingError::Dependency {
                service: "execution",
                ..
            }
        ));

        // The submission was accepted and its evaluation is terminal.
        let subms = app.grader.list_submissions(10, 0).await.unwrap();
        assert_eq!(subms.len(), 1);
        let eval = app
            .grader
            .get_evaluation(subms[0].curr_eval_uuid)
            .await
            .unwrap();
        assert!(eval.is_finished());
        assert_eq!(eval.error.unwrap().kind, EvalErrorKind::Internal);
        assert_eq!(app.grader.in_flight(), 0);
    }

    #[tokio::test]
    async fn url_resolution_failure_aborts_enqueue() {
        let app = TestGrader::spawn();
        app.tasks.fail_urls.store(true, Ordering::SeqCst);

        let err = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DEPENDENCY_ERROR");
        assert!(app.exec.requests().is_empty());
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn second_submission_within_cooldown_is_rejected() {
        let app = TestGrader::spawn();
        app.grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();

        let err = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::TooFrequent { .. }));
        assert!(err.retry_after().is_some_and(|s| s > 0 && s <= 10));

        // Another author is not affected.
        app.grader
            .submit(app.new_submission(app.bob, "sum"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cooldown_is_configurable() {
        let app = TestGrader::spawn_with(GradingConfig {
            submission_cooldown_secs: 0,
            ..Default::default()
        });
        for _ in 0..3 {
            app.grader
                .submit(app.new_submission(app.alice, "sum"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn oversized_submission_is_rejected_before_any_state() {
        let app = TestGrader::spawn();
        let mut req = app.new_submission(app.alice, "sum");
        req.content = "x".repeat(64 * 1024 + 1);

        let err = app.grader.submit(req).await.unwrap_err();
        assert!(matches!(
            err,
            GradingError::SubmissionTooLong {
                size: 65537,
                limit: 65536
            }
        ));
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(app.grader.list_submissions(10, 0).await.unwrap().is_empty());

        // Exactly at the limit is fine.
        let mut req = app.new_submission(app.alice, "sum");
        req.content = "x".repeat(64 * 1024);
        app.grader.submit(req).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_dependencies_are_rejected() {
        let app = TestGrader::spawn();

        let err = app
            .grader
            .submit(app.new_submission(uuid::Uuid::new_v4(), "sum"))
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::UserNotFound(_)));

        let mut req = app.new_submission(app.alice, "sum");
        req.lang_short_id = "cobol".into();
        let err = app.grader.submit(req).await.unwrap_err();
        assert!(matches!(err, GradingError::LanguageNotFound(_)));

        let mut req = app.new_submission(app.alice, "sum");
        req.lang_short_id = "python3.10".into();
        let err = app.grader.submit(req).await.unwrap_err();
        assert!(matches!(err, GradingError::LanguageNotFound(_)));

        let err = app
            .grader
            .submit(app.new_submission(app.alice, "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::TaskNotFound(_)));
        assert_eq!(err.code(), "NOT_FOUND");

        // None of the rejections used up the cooldown.
        app.grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
    }
}

mod reevaluation {
    use super::*;

    #[tokio::test]
    async fn waiter_sees_finish_overtaken_by_reevaluation() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        let first = subm.curr_eval_uuid;

        // Subscribe the waiter before anything happens.
        let mut waiter = Box::pin(
            app.grader
                .wait_for_evaluation(first, std::time::Duration::from_millis(200)),
        );
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        app.exec
            .send_all(first, full_run(vec![accepted(1), accepted(2)]))
            .await;
        app.wait(first).await;

        // The new Waiting snapshot replaces the unread terminal one.
        app.grader.reevaluate(subm.uuid).await.unwrap();

        let eval = waiter.await.unwrap();
        assert_eq!(eval.uuid, first);
        assert!(eval.is_finished());
    }

    #[tokio::test]
    async fn reevaluation_creates_new_evaluation() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        let first = subm.curr_eval_uuid;
        app.exec
            .send_all(first, full_run(vec![accepted(1), wrong(2)]))
            .await;
        let old = app.wait(first).await;

        // The task got easier: one test left.
        app.tasks.add(plain_task("sum", 1));
        let eval = app.grader.reevaluate(subm.uuid).await.unwrap();
        assert_ne!(eval.uuid, first);
        assert_eq!(eval.stage, EvalStage::Waiting);
        assert_eq!(eval.tests.len(), 1);

        let reloaded = app.grader.get_submission(subm.uuid).await.unwrap();
        assert_eq!(reloaded.curr_eval_uuid, eval.uuid);

        app.exec
            .send_all(eval.uuid, full_run(vec![accepted(1)]))
            .await;
        let new = app.wait(eval.uuid).await;
        assert_eq!(new.score().received_score, 1);
        assert!(new.score().is_full());

        // The previous evaluation is untouched.
        assert_eq!(app.grader.get_evaluation(first).await.unwrap(), old);
    }

    #[tokio::test]
    async fn reevaluation_is_not_rate_limited() {
        let app = TestGrader::spawn();
        let subm = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        app.grader.reevaluate(subm.uuid).await.unwrap();
        app.grader.reevaluate(subm.uuid).await.unwrap();
    }

    #[tokio::test]
    async fn reevaluating_unknown_submission_fails() {
        let app = TestGrader::spawn();
        let id = uuid::Uuid::new_v4();
        let err = app.grader.reevaluate(id).await.unwrap_err();
        assert!(matches!(err, GradingError::SubmissionNotFound(got) if got == id));
    }
}

mod scores {
    use super::*;

    #[tokio::test]
    async fn best_score_per_task() {
        let app = TestGrader::spawn_with(GradingConfig {
            submission_cooldown_secs: 0,
            ..Default::default()
        });

        let first = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        app.exec
            .send_all(first.curr_eval_uuid, full_run(vec![accepted(1), wrong(2)]))
            .await;
        app.wait(first.curr_eval_uuid).await;

        let second = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        app.exec
            .send_all(second.curr_eval_uuid, full_run(vec![accepted(1), accepted(2)]))
            .await;
        app.wait(second.curr_eval_uuid).await;

        // Same score as the first one, but later.
        let third = app
            .grader
            .submit(app.new_submission(app.alice, "sum"))
            .await
            .unwrap();
        app.exec
            .send_all(third.curr_eval_uuid, full_run(vec![accepted(1), accepted(2)]))
            .await;
        app.wait(third.curr_eval_uuid).await;

        app.grader
            .submit(app.new_submission(app.bob, "sum"))
            .await
            .unwrap();

        let best = app.grader.best_scores_by_task(app.alice).await.unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best["sum"].subm_uuid, second.uuid);
        assert_eq!(best["sum"].received, 2);
        assert_eq!(best["sum"].possible, 2);
    }
}
