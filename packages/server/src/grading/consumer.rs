use std::sync::Arc;

use common::{EvalErrorKind, Evaluation, ExecEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Pipeline;
use super::adapter::apply_event;

/// Sole writer of one evaluation until it is finished.
///
/// Applies events in arrival order, mirrors each snapshot into the live
/// cache and broadcasts it. If the stream ends early or goes quiet for
/// longer than the idle timeout, the evaluation is finished as an internal
/// error.
pub(crate) async fn run_consumer(
    pipeline: Arc<Pipeline>,
    mut eval: Evaluation,
    mut events: mpsc::Receiver<ExecEvent>,
    cancel: CancellationToken,
) {
    let idle = pipeline.config.event_idle_timeout();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(eval_uuid = %eval.uuid, "Consumer cancelled");
                return;
            }
            next = tokio::time::timeout(idle, events.recv()) => next,
        };

        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => {
                error!(
                    eval_uuid = %eval.uuid,
                    stage = %eval.stage,
                    "Execution event stream closed before a terminal event"
                );
                abort(&pipeline, eval, "execution event stream closed unexpectedly").await;
                return;
            }
            Err(_) => {
                error!(
                    eval_uuid = %eval.uuid,
                    stage = %eval.stage,
                    idle_secs = idle.as_secs(),
                    "No execution event within idle timeout"
                );
                abort(&pipeline, eval, "execution service stopped responding").await;
                return;
            }
        };

        if let Err(e) = apply_event(&mut eval, &event) {
            error!(
                eval_uuid = %eval.uuid,
                event = event.kind(),
                error = %e,
                "Ignoring execution event"
            );
            continue;
        }
        debug!(
            eval_uuid = %eval.uuid,
            event = event.kind(),
            stage = %eval.stage,
            "Applied execution event"
        );

        if !pipeline.live.update(&eval) {
            info!(eval_uuid = %eval.uuid, "Evaluation claimed elsewhere, consumer stopping");
            return;
        }
        pipeline.publish(&eval);

        if event.is_terminal() {
            let _ = pipeline.finalizer.finalize(&eval).await;
            return;
        }
    }
}

async fn abort(pipeline: &Pipeline, mut eval: Evaluation, reason: &str) {
    eval.fail(EvalErrorKind::Internal, Some(reason.to_string()));
    if !pipeline.live.update(&eval) {
        warn!(eval_uuid = %eval.uuid, "Evaluation claimed elsewhere, not aborting");
        return;
    }
    pipeline.publish(&eval);
    let _ = pipeline.finalizer.finalize(&eval).await;
}
