//! Non-blocking fan-out of snapshots to subscribers.
//!
//! Publishing never waits on a subscriber: every subscription owns a small
//! mailbox whose [`DeliveryPolicy`] decides what is dropped when the
//! subscriber falls behind.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use common::{Evaluation, ScoreInfo, Submission};
use futures::Stream;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Items are coalesced and filtered by key.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

impl Keyed for Submission {
    fn key(&self) -> Uuid {
        self.uuid
    }
}

/// Snapshot of an evaluation, published after every applied event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EvalUpdate {
    pub subm_uuid: Uuid,
    pub evaluation: Evaluation,
    pub score: ScoreInfo,
}

impl EvalUpdate {
    pub fn new(evaluation: Evaluation) -> Self {
        Self {
            subm_uuid: evaluation.subm_uuid,
            score: evaluation.score(),
            evaluation,
        }
    }
}

impl Keyed for EvalUpdate {
    fn key(&self) -> Uuid {
        self.subm_uuid
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Buffer of one: a new item overwrites an unread one.
    LatestValue,
    /// Bounded queue. When full, the oldest item with the same key is
    /// dropped if `coalesce_by_key` is set and one is buffered, otherwise the
    /// oldest item overall.
    BoundedFifo {
        capacity: usize,
        coalesce_by_key: bool,
    },
}

struct MailboxState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Mailbox<T> {
    state: Mutex<MailboxState<T>>,
    notify: Notify,
}

impl<T: Keyed> Mailbox<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MailboxState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, policy: DeliveryPolicy, item: T) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            match policy {
                DeliveryPolicy::LatestValue => state.queue.clear(),
                DeliveryPolicy::BoundedFifo {
                    capacity,
                    coalesce_by_key,
                } => {
                    if state.queue.len() >= capacity.max(1) {
                        let key = item.key();
                        let victim = coalesce_by_key
                            .then(|| state.queue.iter().position(|i| i.key() == key))
                            .flatten()
                            .unwrap_or(0);
                        state.queue.remove(victim);
                    }
                }
            }
            state.queue.push_back(item);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

struct Subscriber<T> {
    id: u64,
    policy: DeliveryPolicy,
    filter: Option<Uuid>,
    mailbox: Arc<Mailbox<T>>,
}

struct Inner<T> {
    subscribers: Mutex<Vec<Subscriber<T>>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

impl<T> Inner<T> {
    fn remove(&self, id: u64) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| s.id != id);
    }
}

/// Fan-out hub for one kind of item.
pub struct Broadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Keyed + Clone + Send + 'static> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed + Clone + Send + 'static> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Register a subscriber receiving every item, or only items whose key
    /// equals `filter`. The subscription ends when `cancel` fires, when it
    /// is dropped, or when the broadcaster is closed.
    pub fn subscribe(
        &self,
        policy: DeliveryPolicy,
        filter: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Subscription<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mailbox = Arc::new(Mailbox::new());
        let scope = cancel.child_token();

        if self.inner.closed.is_cancelled() {
            mailbox.close();
        } else {
            let mut subs = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            subs.push(Subscriber {
                id,
                policy,
                filter,
                mailbox: mailbox.clone(),
            });
        }

        let inner = self.inner.clone();
        let watched = mailbox.clone();
        let scope_watch = scope.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = scope_watch.cancelled() => {}
                _ = inner.closed.cancelled() => {}
            }
            inner.remove(id);
            watched.close();
            debug!(subscriber = id, "Subscriber removed");
        });

        Subscription {
            mailbox,
            _scope: scope.drop_guard(),
        }
    }

    /// Deliver a copy of `item` to every matching subscriber. Returns the
    /// number of subscribers it was handed to.
    pub fn publish(&self, item: &T) -> usize {
        let key = item.key();
        let mut subs = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| !s.mailbox.is_closed());

        let mut delivered = 0;
        for sub in subs.iter().filter(|s| s.filter.is_none_or(|f| f == key)) {
            sub.mailbox.push(sub.policy, item.clone());
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        let subs = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subs.iter().filter(|s| !s.mailbox.is_closed()).count()
    }

    /// End every current and future subscription.
    pub fn close(&self) {
        self.inner.closed.cancel();
        let subs = std::mem::take(
            &mut *self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        for sub in subs {
            sub.mailbox.close();
        }
    }
}

/// Receiving end of a subscription.
pub struct Subscription<T> {
    mailbox: Arc<Mailbox<T>>,
    _scope: tokio_util::sync::DropGuard,
}

impl<T: Keyed + Send + 'static> Subscription<T> {
    /// Next buffered item. Returns `None` once the subscription has ended
    /// and its buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut state = self.mailbox.lock();
                if let Some(item) = state.queue.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.mailbox.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.mailbox.lock().queue.pop_front()
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|item| (item, sub))
        })
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
