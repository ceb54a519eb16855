//! The grading pipeline: applying execution events to live evaluations,
//! finalizing them and reaping the ones that stall.

pub mod adapter;
mod consumer;
mod finalizer;
pub mod live;
pub mod rate_limit;
mod reaper;

pub use adapter::{ApplyError, apply_event};
pub use finalizer::Finalizer;
pub use live::LiveCache;
pub use rate_limit::RateLimiter;

pub(crate) use consumer::run_consumer;
pub(crate) use reaper::run_reaper;

use std::sync::Arc;

use common::{Evaluation, GradingConfig};

use crate::broadcast::{Broadcaster, EvalUpdate};

/// State shared by every consumer and the reaper.
pub(crate) struct Pipeline {
    pub live: Arc<LiveCache>,
    pub finalizer: Finalizer,
    pub updates: Broadcaster<EvalUpdate>,
    pub config: GradingConfig,
}

impl Pipeline {
    pub fn publish(&self, eval: &Evaluation) {
        self.updates.publish(&EvalUpdate::new(eval.clone()));
    }
}
