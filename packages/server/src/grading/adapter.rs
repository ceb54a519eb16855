//! Applies execution events to an evaluation.

use common::{EvalErrorKind, EvalStage, Evaluation, ExecEvent, RunData, Verdict};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// Event referenced a test the evaluation does not have. The evaluation
    /// is left unchanged.
    #[error("test {test_id} out of range 1..={tests}")]
    TestOutOfRange { test_id: u32, tests: usize },
}

/// Apply one event in place. Events must be applied in delivery order.
pub fn apply_event(eval: &mut Evaluation, event: &ExecEvent) -> Result<(), ApplyError> {
    match event {
        ExecEvent::ReceivedSubmission => {}
        ExecEvent::StartedCompiling => eval.stage = EvalStage::Compiling,
        ExecEvent::StartedTesting => eval.stage = EvalStage::Testing,
        ExecEvent::FinishedTesting => eval.stage = EvalStage::Finished,
        ExecEvent::CompilationError { message } => {
            eval.fail(EvalErrorKind::Compilation, message.clone());
        }
        ExecEvent::InternalServerError { message } => {
            eval.fail(EvalErrorKind::Internal, message.clone());
        }
        ExecEvent::ReachedTest { test_id } => {
            test_mut(eval, *test_id)?.reached = true;
        }
        ExecEvent::IgnoredTest { test_id } => {
            test_mut(eval, *test_id)?.ignored = true;
        }
        ExecEvent::FinishedTest {
            test_id,
            submission,
            checker,
        } => {
            let (cpu_lim_ms, mem_lim_kib) = (eval.cpu_lim_ms, eval.mem_lim_kib);
            let test = test_mut(eval, *test_id)?;
            test.finished = true;

            if let Some(run) = submission {
                test.cpu_ms = Some(clamp_i32(run.cpu_ms));
                test.mem_kib = Some(clamp_i32(run.mem_kib));
            }

            // Ignored tests finish without an outcome.
            if !test.ignored {
                test.verdict = Some(classify(
                    submission.as_ref(),
                    checker.as_ref(),
                    cpu_lim_ms,
                    mem_lim_kib,
                ));
            }
        }
    }
    Ok(())
}

fn test_mut(eval: &mut Evaluation, test_id: u32) -> Result<&mut common::Test, ApplyError> {
    let tests = eval.tests.len();
    eval.test_mut(test_id)
        .ok_or(ApplyError::TestOutOfRange { test_id, tests })
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(0, i64::from(i32::MAX)) as i32
}

/// First matching rule wins.
pub fn classify(
    submission: Option<&RunData>,
    checker: Option<&RunData>,
    cpu_lim_ms: i32,
    mem_lim_kib: i32,
) -> Verdict {
    if let Some(run) = submission {
        if run.exit_code != 0 || !run.stderr.is_empty() || run.signal.is_some() {
            return Verdict::Re;
        }
        if run.cpu_ms > i64::from(cpu_lim_ms) {
            return Verdict::Tle;
        }
        if run.mem_kib > i64::from(mem_lim_kib) {
            return Verdict::Mle;
        }
    }

    match checker {
        Some(run) if run.exit_code == 0 => Verdict::Ac,
        _ => Verdict::Wa,
    }
}
