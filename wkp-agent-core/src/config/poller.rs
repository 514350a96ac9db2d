//! Poller configuration.

use std::time::Duration;

/// Schedule of one poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Name used in logs, e.g. `cluster-info`.
    pub name: String,
    /// Time between two collections. The first one happens one interval
    /// after the poller starts.
    pub interval: Duration,
}

impl PollerConfig {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }
}
