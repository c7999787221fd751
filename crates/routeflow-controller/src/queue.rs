//! Deduplicating, rate-limited work queue
//!
//! Items are keyed by route. While a key waits, newer notifications replace
//! the pending one, so a burst collapses into a single reconciliation of the
//! latest spec. A key is never handed out twice concurrently: if it is
//! notified while being processed it is queued again once [`WorkQueue::done`]
//! is called.

use crate::route::{RouteKey, RouteSpec};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// What happened to a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub route: RouteSpec,
}

impl Notification {
    pub fn created(route: RouteSpec) -> Self {
        Self {
            kind: NotificationKind::Created,
            route,
        }
    }

    pub fn updated(route: RouteSpec) -> Self {
        Self {
            kind: NotificationKind::Updated,
            route,
        }
    }

    pub fn deleted(route: RouteSpec) -> Self {
        Self {
            kind: NotificationKind::Deleted,
            route,
        }
    }

    pub fn key(&self) -> &RouteKey {
        &self.route.key
    }
}

/// Per-item exponential retry delay
#[derive(Debug, Clone)]
pub struct RateLimit {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
        }
    }
}

impl RateLimit {
    /// Delay before retry number `failures` (0-based)
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(31));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    order: VecDeque<RouteKey>,
    queued: HashSet<RouteKey>,
    pending: HashMap<RouteKey, Notification>,
    processing: HashSet<RouteKey>,
    failures: HashMap<RouteKey, u32>,
    /// Bumped on every external add; stale delayed retries are dropped
    generation: HashMap<RouteKey, u64>,
    /// Delayed retries not yet fired
    scheduled: HashMap<RouteKey, u32>,
    shut_down: bool,
}

impl QueueState {
    fn enqueue(&mut self, key: RouteKey) -> bool {
        if self.processing.contains(&key) || !self.queued.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        true
    }

    /// Drops the generation of a key nothing refers to anymore
    fn release(&mut self, key: &RouteKey) {
        if !self.pending.contains_key(key)
            && !self.queued.contains(key)
            && !self.processing.contains(key)
            && !self.scheduled.contains_key(key)
        {
            self.generation.remove(key);
        }
    }
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    rate_limit: RateLimit,
}

/// Cloneable handle to the queue
#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<Shared>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(RateLimit::default())
    }
}

impl WorkQueue {
    pub fn new(rate_limit: RateLimit) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                rate_limit,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a notification, replacing any pending one for the same route
    pub fn add(&self, notification: Notification) {
        let mut state = self.state();
        if state.shut_down {
            return;
        }
        let key = notification.key().clone();
        *state.generation.entry(key.clone()).or_default() += 1;
        state.pending.insert(key.clone(), notification);
        if state.enqueue(key) {
            self.shared.notify.notify_one();
        }
    }

    /// Schedules a retry after the item's backoff delay
    ///
    /// The retry is dropped if a newer notification for the route arrives
    /// in the meantime.
    pub fn add_rate_limited(&self, notification: Notification) {
        let key = notification.key().clone();
        let (delay, generation) = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_default();
            let delay = self.shared.rate_limit.delay(*failures);
            *failures += 1;
            *state.scheduled.entry(key.clone()).or_default() += 1;
            (delay, state.generation.get(&key).copied().unwrap_or_default())
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.readd(notification, generation);
        });
    }

    fn readd(&self, notification: Notification, generation: u64) {
        let mut state = self.state();
        let key = notification.key().clone();
        if let Some(count) = state.scheduled.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                state.scheduled.remove(&key);
            }
        }
        if state.shut_down || state.generation.get(&key).copied().unwrap_or_default() != generation
        {
            tracing::debug!(route = %key, "Dropping superseded retry");
            state.release(&key);
            return;
        }
        state.pending.entry(key.clone()).or_insert(notification);
        if state.enqueue(key) {
            self.shared.notify.notify_one();
        }
    }

    /// Waits for the next item; `None` once the queue is shut down
    pub async fn next(&self) -> Option<Notification> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.state();
                while let Some(key) = state.order.pop_front() {
                    state.queued.remove(&key);
                    if let Some(notification) = state.pending.remove(&key) {
                        state.processing.insert(key);
                        return Some(notification);
                    }
                }
                if state.shut_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks the key as no longer being processed
    pub fn done(&self, key: &RouteKey) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.pending.contains_key(key) && state.enqueue(key.clone()) {
            self.shared.notify.notify_one();
        }
        state.release(key);
    }

    /// Clears the retry history of a key
    pub fn forget(&self, key: &RouteKey) {
        let mut state = self.state();
        state.failures.remove(key);
        state.release(key);
    }

    /// Number of retries scheduled for a key since it was last forgotten
    pub fn num_requeues(&self, key: &RouteKey) -> u32 {
        self.state().failures.get(key).copied().unwrap_or_default()
    }

    /// Number of items waiting to be handed out
    pub fn len(&self) -> usize {
        self.state().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops handing out items; waiting consumers receive `None`
    pub fn shutdown(&self) {
        self.state().shut_down = true;
        self.shared.notify.notify_waiters();
    }
}
