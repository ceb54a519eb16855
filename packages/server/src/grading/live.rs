//! In-memory copies of the evaluations currently being graded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use common::Evaluation;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct LiveEntry {
    eval: Evaluation,
    updated_at: Instant,
    /// Set once the consumer or the reaper has claimed finalization.
    finalizing: bool,
    /// Cancels the consumer that owns this evaluation.
    cancel: CancellationToken,
}

/// An evaluation whose finalization was claimed by the caller.
pub struct Claimed {
    pub eval: Evaluation,
    pub cancel: CancellationToken,
}

/// Evaluations in flight, keyed by evaluation uuid.
///
/// Each entry has a single writer, its consumer. The mutex only guards map
/// access and is never held across an await.
#[derive(Default)]
pub struct LiveCache {
    entries: Mutex<HashMap<Uuid, LiveEntry>>,
}

impl LiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, LiveEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, eval: Evaluation, cancel: CancellationToken) {
        self.lock().insert(
            eval.uuid,
            LiveEntry {
                eval,
                updated_at: Instant::now(),
                finalizing: false,
                cancel,
            },
        );
    }

    /// Replace the snapshot. Returns false when the evaluation is gone or
    /// already being finalized, in which case the caller no longer owns it.
    pub fn update(&self, eval: &Evaluation) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(&eval.uuid) {
            Some(entry) if !entry.finalizing => {
                entry.eval = eval.clone();
                entry.updated_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, uuid: Uuid) -> Option<Evaluation> {
        self.lock().get(&uuid).map(|e| e.eval.clone())
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.lock().contains_key(&uuid)
    }

    /// Claim finalization. Only the first caller for an evaluation gets the
    /// latest snapshot back.
    pub fn begin_finalize(&self, uuid: Uuid) -> Option<Claimed> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&uuid)?;
        if entry.finalizing {
            return None;
        }
        entry.finalizing = true;
        Some(Claimed {
            eval: entry.eval.clone(),
            cancel: entry.cancel.clone(),
        })
    }

    pub fn remove(&self, uuid: Uuid) -> Option<Evaluation> {
        self.lock().remove(&uuid).map(|e| e.eval)
    }

    /// Unclaimed evaluations not updated for at least `threshold`.
    pub fn stale(&self, threshold: Duration) -> Vec<Uuid> {
        let now = Instant::now();
        self.lock()
            .iter()
            .filter(|(_, e)| !e.finalizing && now.duration_since(e.updated_at) >= threshold)
            .map(|(uuid, _)| *uuid)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
