//! Configuration types for the wkp-agent pipeline.
//!
//! These types represent the validated runtime configuration handed to the
//! watchers, pollers and transports. Loading and parsing the configuration
//! file is handled by the agent binary.

mod poller;
mod transport;
mod watcher;

pub use poller::PollerConfig;
pub use transport::{DEFAULT_TRANSPORT_TIMEOUT, TransportConfig};
pub use watcher::{DEFAULT_CACHE_SYNC_TIMEOUT, DEFAULT_MAX_RETRIES, WatcherConfig};
