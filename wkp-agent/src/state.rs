//! Application state shared across all request handlers.

use std::sync::Arc;
use std::time::Instant;
use wkp_agent_core::processors::PollerStats;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    /// Counters of every running poller, by poller name.
    pollers: Arc<Vec<(String, Arc<PollerStats>)>>,
}

impl AppState {
    pub fn new(pollers: Vec<(String, Arc<PollerStats>)>) -> Self {
        Self {
            started_at: Instant::now(),
            pollers: Arc::new(pollers),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn pollers(&self) -> &[(String, Arc<PollerStats>)] {
        &self.pollers
    }
}
