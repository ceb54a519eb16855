use std::sync::Arc;

use anyhow::Context;
use common::EvalErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::Pipeline;

/// Error recorded on evaluations the reaper finishes.
pub(crate) const STUCK_MESSAGE: &str = "evaluation timed out";

/// Periodically finish evaluations that stopped making progress.
pub(crate) async fn run_reaper(pipeline: Arc<Pipeline>, cancel: CancellationToken) {
    let scan_interval = pipeline.config.stuck_scan_interval();

    info!(
        timeout_secs = pipeline.config.stuck_evaluation_timeout_secs,
        scan_interval_secs = scan_interval.as_secs(),
        "Starting stuck evaluation reaper"
    );

    let mut interval = tokio::time::interval(scan_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Err(e) = reap_stuck_evaluations(&pipeline).await {
            error!(error = %e, "Stuck evaluation scan failed");
        }
    }

    info!("Stuck evaluation reaper stopped");
}

/// Finish every stale live evaluation as an internal error.
pub(crate) async fn reap_stuck_evaluations(pipeline: &Pipeline) -> anyhow::Result<usize> {
    let stuck = pipeline
        .live
        .stale(pipeline.config.stuck_evaluation_timeout());

    if stuck.is_empty() {
        return Ok(0);
    }

    warn!(count = stuck.len(), "Found stuck evaluations");

    let mut reaped = 0;
    for eval_uuid in stuck {
        match handle_stuck_evaluation(pipeline, eval_uuid).await {
            Ok(true) => reaped += 1,
            Ok(false) => {}
            Err(e) => error!(
                eval_uuid = %eval_uuid,
                error = %e,
                "Failed to handle stuck evaluation"
            ),
        }
    }

    Ok(reaped)
}

async fn handle_stuck_evaluation(pipeline: &Pipeline, eval_uuid: Uuid) -> anyhow::Result<bool> {
    // The consumer may have finished it since the scan.
    let Some(claimed) = pipeline.live.begin_finalize(eval_uuid) else {
        return Ok(false);
    };
    claimed.cancel.cancel();

    let mut eval = claimed.eval;
    eval.fail(EvalErrorKind::Internal, Some(STUCK_MESSAGE.to_string()));
    pipeline.publish(&eval);

    pipeline
        .finalizer
        .persist_claimed(&eval)
        .await
        .with_context(|| format!("persisting stuck evaluation {eval_uuid}"))?;

    info!(eval_uuid = %eval_uuid, subm_uuid = %eval.subm_uuid, "Reaped stuck evaluation");
    Ok(true)
}
