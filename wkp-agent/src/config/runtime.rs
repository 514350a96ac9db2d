//! Validated runtime configuration.
//!
//! The component config types are defined in `wkp-agent-core::config`.
//! This module re-exports them and groups them per agent.

pub use wkp_agent_core::config::{PollerConfig, TransportConfig, WatcherConfig};

use std::net::SocketAddr;

/// Everything the agent needs to wire its components.
///
/// A `None` component is disabled.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: String,
    pub transport: TransportConfig,
    pub events_watcher: Option<WatcherConfig>,
    pub cluster_info: Option<PollerConfig>,
    pub flux_info: Option<PollerConfig>,
    pub health_listen: SocketAddr,
}
