//! Watcher configuration.

use std::time::Duration;

/// Retries allowed after the first failed attempt of a notification.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// How long a watcher waits for its informer's initial list.
pub const DEFAULT_CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Number of worker tasks draining the queue.
    pub workers: usize,
    pub max_retries: u32,
    pub cache_sync_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_retries: DEFAULT_MAX_RETRIES,
            cache_sync_timeout: DEFAULT_CACHE_SYNC_TIMEOUT,
        }
    }
}
