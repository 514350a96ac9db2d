//! Rate-limited work queue decoupling notification from processing.
//!
//! Notifications are grouped per object key. A key is handed to at most one
//! worker at a time and its notifications come out in the order they went
//! in. Retries go through the rate limiter and are discarded once a newer
//! notification for the same key exists, so the latest state always wins.

pub mod rate_limiter;

pub use rate_limiter::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
    default_controller_rate_limiter,
};

use crate::events::ChangeEvent;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

/// Shared handle to a work queue; clones refer to the same queue.
pub struct WorkQueue<K> {
    inner: Arc<QueueInner<K>>,
}

struct QueueInner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    limiter: Box<dyn RateLimiter>,
}

struct QueueState<K> {
    /// Keys with pending events that no worker holds. Each key at most once.
    ready: VecDeque<String>,
    pending: HashMap<String, VecDeque<ChangeEvent<K>>>,
    processing: HashSet<String>,
    /// Generation of the newest notification seen per key.
    latest: HashMap<String, u64>,
    /// Number of retries waiting out their backoff per key.
    waiting: HashMap<String, usize>,
    next_generation: u64,
    shutting_down: bool,
}

impl<K> QueueState<K> {
    /// Append an event; returns whether its key became ready.
    fn push(&mut self, event: ChangeEvent<K>) -> bool {
        let key = event.key().to_string();
        let events = self.pending.entry(key.clone()).or_default();
        let was_empty = events.is_empty();
        events.push_back(event);

        if was_empty && !self.processing.contains(&key) {
            self.ready.push_back(key);
            true
        } else {
            false
        }
    }

    fn pop_ready(&mut self) -> Option<ChangeEvent<K>> {
        while let Some(key) = self.ready.pop_front() {
            let Some(events) = self.pending.get_mut(&key) else {
                continue;
            };
            let Some(event) = events.pop_front() else {
                self.pending.remove(&key);
                continue;
            };
            if events.is_empty() {
                self.pending.remove(&key);
            }
            self.processing.insert(key);
            return Some(event);
        }
        None
    }

    fn is_superseded(&self, event: &ChangeEvent<K>) -> bool {
        self.latest.get(event.key()) != Some(&event.generation)
    }

    /// Drop bookkeeping for a key nothing refers to anymore.
    fn release_if_idle(&mut self, key: &str) {
        if !self.pending.contains_key(key)
            && !self.processing.contains(key)
            && !self.waiting.contains_key(key)
        {
            self.latest.remove(key);
        }
    }

    fn finish_waiting(&mut self, key: &str) {
        if let Some(count) = self.waiting.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.waiting.remove(key);
            }
        }
    }
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new(default_controller_rate_limiter())
    }
}

impl<K> WorkQueue<K> {
    pub fn new(limiter: impl RateLimiter + 'static) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    ready: VecDeque::new(),
                    pending: HashMap::new(),
                    processing: HashSet::new(),
                    latest: HashMap::new(),
                    waiting: HashMap::new(),
                    next_generation: 0,
                    shutting_down: false,
                }),
                notify: Notify::new(),
                limiter: Box::new(limiter),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a new notification.
    ///
    /// Assigns the event its generation and makes it the latest state of its
    /// key. Ignored once the queue is shutting down.
    pub fn add(&self, mut event: ChangeEvent<K>) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.next_generation += 1;
        event.generation = state.next_generation;
        state
            .latest
            .insert(event.key().to_string(), event.generation);
        let ready = state.push(event);
        drop(state);

        if ready {
            self.inner.notify.notify_one();
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the queue has been shut down. The caller owns the
    /// event's key until it calls [`done`](WorkQueue::done).
    pub async fn get(&self) -> Option<ChangeEvent<K>> {
        loop {
            // Registered before the state check so a notify_one between the
            // check and the await is not lost.
            let notified = self.inner.notify.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(event) = state.pop_ready() {
                    return Some(event);
                }
            }
            notified.await;
        }
    }

    /// Release the key of an event returned by [`get`](WorkQueue::get).
    pub fn done(&self, event: &ChangeEvent<K>) {
        let key = event.key();
        let mut state = self.lock();
        state.processing.remove(key);

        let ready = if state.pending.get(key).is_some_and(|events| !events.is_empty()) {
            state.ready.push_back(key.to_string());
            true
        } else {
            state.release_if_idle(key);
            false
        };
        drop(state);

        if ready {
            self.inner.notify.notify_one();
        }
    }

    /// Whether a newer notification for the event's key has been enqueued.
    pub fn is_superseded(&self, event: &ChangeEvent<K>) -> bool {
        self.lock().is_superseded(event)
    }

    /// Forget the retry history of an event.
    pub fn forget(&self, event: &ChangeEvent<K>) {
        self.inner.limiter.forget(&event.id());
    }

    /// How many times the event has been requeued after failing.
    pub fn num_requeues(&self, event: &ChangeEvent<K>) -> u32 {
        self.inner.limiter.num_requeues(&event.id())
    }

    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of events waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().pending.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn readd(&self, event: ChangeEvent<K>) {
        let mut state = self.lock();
        state.finish_waiting(event.key());
        if state.shutting_down {
            return;
        }
        if state.is_superseded(&event) {
            debug!(
                key = %event.key(),
                change_type = %event.change_type(),
                "Discarding retry superseded by a newer notification"
            );
            self.inner.limiter.forget(&event.id());
            state.release_if_idle(event.key());
            return;
        }
        let ready = state.push(event);
        drop(state);

        if ready {
            self.inner.notify.notify_one();
        }
    }
}

impl<K: Send + Sync + 'static> WorkQueue<K> {
    /// Put a failed event back once the rate limiter allows it.
    ///
    /// The event keeps its generation, so it is dropped instead of re-added
    /// if a newer notification for the key arrives in the meantime.
    pub fn add_rate_limited(&self, event: ChangeEvent<K>) {
        let delay = self.inner.limiter.when(&event.id());
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            *state.waiting.entry(event.key().to_string()).or_insert(0) += 1;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.readd(event);
        });
    }
}
