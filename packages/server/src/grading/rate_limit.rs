//! Per-author submission cooldown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Remembers when each author last had a submission accepted.
pub struct RateLimiter {
    cooldown: Duration,
    last: Arc<Mutex<HashMap<String, Instant>>>,
}

/// A slot taken by [`RateLimiter::reserve`]. Dropping it without calling
/// [`Reservation::commit`] gives the slot back.
#[must_use]
pub struct Reservation {
    last: Arc<Mutex<HashMap<String, Instant>>>,
    author: String,
    previous: Option<Instant>,
    committed: bool,
}

impl Reservation {
    /// Keep the slot: the submission was accepted.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match self.previous {
            Some(prev) => {
                last.insert(self.author.clone(), prev);
            }
            None => {
                last.remove(&self.author);
            }
        }
    }
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of authors currently in cooldown.
    pub fn tracked(&self) -> usize {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Check and take the author's slot in one step. On rejection returns
    /// the remaining wait.
    pub fn reserve(&self, author: &str) -> Result<Reservation, Duration> {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        // Entries past the cooldown no longer restrict anyone.
        last.retain(|_, at| now.duration_since(*at) < self.cooldown);

        let previous = last.get(author).copied();
        if let Some(prev) = previous {
            let elapsed = now.duration_since(prev);
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }

        last.insert(author.to_string(), now);
        Ok(Reservation {
            last: self.last.clone(),
            author: author.to_string(),
            previous,
            committed: false,
        })
    }
}
