//! Poller processor.
//!
//! The Poller is responsible for:
//! - Invoking its collector once per interval, starting one interval after launch
//! - Sending every collected snapshot through the `EventSender`
//! - Logging and counting failures without retrying them
//!
//! Each tick is independent: a failed collection or delivery is simply
//! superseded by the next tick's full snapshot.

use crate::config::PollerConfig;
use crate::processors::sender::{EventSender, SendError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use wkp_agent_sdk::EventPayload;

/// Errors of a single poller tick.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("collection failed: {0}")]
    Collect(String),

    #[error(transparent)]
    Send(#[from] SendError),
}

/// Builds one full-state snapshot per tick.
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    type Payload: EventPayload + Send + Sync;
    type Error: Display + Send + Sync + 'static;

    async fn collect(&self) -> Result<Self::Payload, Self::Error>;
}

/// [`Collector`] backed by an async closure.
pub struct CollectFn<F>(F);

pub fn collect_fn<F>(f: F) -> CollectFn<F> {
    CollectFn(f)
}

#[async_trait]
impl<F, Fut, P, E> Collector for CollectFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, E>> + Send,
    P: EventPayload + Send + Sync,
    E: Display + Send + Sync + 'static,
{
    type Payload = P;
    type Error = E;

    async fn collect(&self) -> Result<P, E> {
        (self.0)().await
    }
}

/// Counters of a poller's activity.
#[derive(Debug, Default)]
pub struct PollerStats {
    ticks: AtomicU64,
    delivered: AtomicU64,
    collect_failures: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollerStatsSnapshot {
    pub ticks: u64,
    pub delivered: u64,
    pub collect_failures: u64,
    pub send_failures: u64,
}

impl PollerStats {
    pub fn snapshot(&self) -> PollerStatsSnapshot {
        PollerStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            collect_failures: self.collect_failures.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Time-driven processor sending a fresh snapshot every interval.
pub struct Poller<C> {
    config: PollerConfig,
    collector: C,
    sender: EventSender,
    stats: Arc<PollerStats>,
}

impl<C: Collector> Poller<C> {
    pub fn new(config: PollerConfig, collector: C, sender: EventSender) -> Self {
        Self {
            config,
            collector,
            sender,
            stats: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Shared handle to this poller's counters.
    pub fn stats(&self) -> Arc<PollerStats> {
        Arc::clone(&self.stats)
    }

    /// Collect and send one snapshot.
    pub async fn tick(&self) -> Result<(), PollError> {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let payload = match self.collector.collect().await {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.collect_failures.fetch_add(1, Ordering::Relaxed);
                return Err(PollError::Collect(e.to_string()));
            }
        };

        if let Err(e) = self.sender.send(&payload).await {
            self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        debug!(poller = %self.config.name, "Snapshot delivered");
        Ok(())
    }

    /// Run the Poller until shutdown is signalled.
    ///
    /// Ticks never overlap; a tick that overruns the interval delays the next
    /// one instead of causing a burst.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let interval = self.config.interval;
        if interval.is_zero() {
            error!(poller = %self.config.name, "Poller interval must be non-zero, not starting");
            return;
        }

        if *shutdown_rx.borrow_and_update() {
            info!(poller = %self.config.name, "Shutdown already signalled, not starting");
            return;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poller = %self.config.name, interval = ?interval, "Poller started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(poller = %self.config.name, "Poller received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(poller = %self.config.name, error = %e, "Poller tick failed");
                    }
                }
            }
        }

        info!(poller = %self.config.name, "Poller shutdown complete");
    }
}
