//! Watcher processor.
//!
//! The Watcher is responsible for:
//! - Running its informer and waiting for the initial list to sync
//! - Draining the work queue with a pool of workers
//! - Retrying failed notifications with rate-limited backoff
//! - Dropping notifications that keep failing and reporting them
//!
//! A notification is retried at most `max_retries` times after its first
//! attempt, and a retry is discarded as soon as a newer notification for the
//! same object has been enqueued.

use crate::config::{DEFAULT_CACHE_SYNC_TIMEOUT, DEFAULT_MAX_RETRIES};
use crate::events::{ChangeEvent, ChangeType};
use crate::informer::{Informer, Notifier};
use crate::processors::wait_for_shutdown;
use crate::queue::{RateLimiter, WorkQueue};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How often the informer is asked whether it has synced.
const CACHE_SYNC_POLL: Duration = Duration::from_millis(100);

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by a watcher.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("informer cache did not sync within {0:?}")]
    CacheSyncTimeout(Duration),

    #[error("shutdown requested before the informer cache synced")]
    ShutdownBeforeSync,

    /// A notification failed on every attempt and was dropped.
    #[error("dropping {change_type} of {key} after {attempts} attempts: {source}")]
    Dropped {
        key: String,
        change_type: ChangeType,
        attempts: u32,
        #[source]
        source: BoxError,
    },
}

/// A handler that panicked, treated like any other failed attempt.
#[derive(Debug, Error)]
#[error("handler panicked: {0}")]
pub struct HandlerPanic(String);

impl HandlerPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self(message)
    }
}

/// Process-wide sink for errors a watcher cannot handle itself.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &WatcherError);
}

/// Reports errors to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &WatcherError) {
        match error {
            WatcherError::Dropped {
                key,
                change_type,
                attempts,
                source,
            } => error!(
                key = %key,
                change_type = %change_type,
                attempts = attempts,
                error = %source,
                "Dropping notification after exhausting retries"
            ),
            other => error!(error = %other, "Watcher failed"),
        }
    }
}

/// Business logic invoked for every change of a watched object.
#[async_trait]
pub trait ChangeHandler<K>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
{
    type Error: std::error::Error + Send + Sync + 'static;

    async fn process(&self, change_type: ChangeType, resource: Arc<K>) -> Result<(), Self::Error>;
}

/// [`ChangeHandler`] backed by an async closure.
pub struct ProcessFn<F>(F);

pub fn process_fn<F>(f: F) -> ProcessFn<F> {
    ProcessFn(f)
}

#[async_trait]
impl<K, F, Fut, E> ChangeHandler<K> for ProcessFn<F>
where
    K: Send + Sync + 'static,
    F: Fn(ChangeType, Arc<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    async fn process(&self, change_type: ChangeType, resource: Arc<K>) -> Result<(), E> {
        (self.0)(change_type, resource).await
    }
}

/// Event-driven processor for one resource type.
pub struct Watcher<I: Informer, H> {
    informer: Arc<I>,
    handler: H,
    queue: WorkQueue<I::Object>,
    reporter: Arc<dyn ErrorReporter>,
    cache_sync_timeout: Duration,
    max_retries: u32,
}

impl<I, H> Watcher<I, H>
where
    I: Informer,
    H: ChangeHandler<I::Object>,
{
    pub fn new(informer: I, handler: H) -> Self {
        Self {
            informer: Arc::new(informer),
            handler,
            queue: WorkQueue::default(),
            reporter: Arc::new(TracingErrorReporter),
            cache_sync_timeout: DEFAULT_CACHE_SYNC_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: impl RateLimiter + 'static) -> Self {
        self.queue = WorkQueue::new(limiter);
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_cache_sync_timeout(mut self, timeout: Duration) -> Self {
        self.cache_sync_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Entry point the informer uses to enqueue changes.
    pub fn notifier(&self) -> Notifier<I::Object> {
        Notifier::new(self.queue.clone())
    }

    /// Process one notification.
    ///
    /// Returns `false` once the queue has been shut down.
    pub async fn process_next(&self) -> bool {
        let Some(event) = self.queue.get().await else {
            return false;
        };

        let result = AssertUnwindSafe(self.handler.process(event.change_type(), event.resource()))
            .catch_unwind()
            .await;
        let result: Result<(), BoxError> = match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Box::new(e)),
            Err(payload) => Err(Box::new(HandlerPanic::from_payload(payload))),
        };

        self.handle_result(&event, result);
        self.queue.done(&event);
        true
    }

    fn handle_result(&self, event: &ChangeEvent<I::Object>, result: Result<(), BoxError>) {
        let error = match result {
            Ok(()) => {
                self.queue.forget(event);
                return;
            }
            Err(error) => error,
        };

        if self.queue.is_superseded(event) {
            debug!(
                key = %event.key(),
                change_type = %event.change_type(),
                error = %error,
                "Failed notification superseded by a newer one, not retrying"
            );
            self.queue.forget(event);
            return;
        }

        let requeues = self.queue.num_requeues(event);
        if requeues < self.max_retries {
            warn!(
                key = %event.key(),
                change_type = %event.change_type(),
                attempt = requeues + 1,
                error = %error,
                "Error processing notification, will retry"
            );
            self.queue.add_rate_limited(event.clone());
            return;
        }

        self.queue.forget(event);
        self.reporter.report(&WatcherError::Dropped {
            key: event.key().to_string(),
            change_type: event.change_type(),
            attempts: requeues + 1,
            source: error,
        });
    }

    async fn wait_for_cache_sync(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), WatcherError> {
        let deadline = Instant::now() + self.cache_sync_timeout;

        loop {
            if self.informer.has_synced() {
                return Ok(());
            }
            if *shutdown_rx.borrow_and_update() {
                return Err(WatcherError::ShutdownBeforeSync);
            }
            if Instant::now() >= deadline {
                return Err(WatcherError::CacheSyncTimeout(self.cache_sync_timeout));
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        return Err(WatcherError::ShutdownBeforeSync);
                    }
                }

                _ = tokio::time::sleep(CACHE_SYNC_POLL) => {}
            }
        }
    }

    /// Run the watcher until shutdown is signalled.
    ///
    /// Workers only start once the informer has synced. Failing to sync is
    /// reported and returned; the rest of the process keeps running.
    pub async fn run(
        self,
        name: &str,
        concurrency: usize,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), WatcherError> {
        let this = Arc::new(self);
        info!(watcher = name, workers = concurrency, "Watcher started");

        let informer_handle = {
            let informer = Arc::clone(&this.informer);
            let notifier = this.notifier();
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { informer.run(notifier, shutdown_rx).await })
        };

        if let Err(e) = this.wait_for_cache_sync(&mut shutdown_rx).await {
            if !matches!(e, WatcherError::ShutdownBeforeSync) {
                this.reporter.report(&e);
            }
            this.queue.shut_down();
            informer_handle.abort();
            return Err(e);
        }
        info!(watcher = name, "Informer cache synced, starting workers");

        let workers: Vec<_> = (0..concurrency)
            .map(|_| {
                let this = Arc::clone(&this);
                tokio::spawn(async move { while this.process_next().await {} })
            })
            .collect();

        wait_for_shutdown(&mut shutdown_rx).await;
        info!(watcher = name, "Watcher received shutdown signal");
        this.queue.shut_down();

        for worker in workers {
            if let Err(e) = worker.await {
                error!(watcher = name, error = %e, "Watcher worker failed");
            }
        }
        if let Err(e) = informer_handle.await {
            error!(watcher = name, error = %e, "Informer task failed");
        }

        info!(watcher = name, "Watcher shutdown complete");
        Ok(())
    }
}
