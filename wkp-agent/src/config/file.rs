//! TOML file configuration structures.
//!
//! These structs directly map to the `wkp-agent.toml` file format. Every
//! section is optional except the collector URL, which may also come from
//! the command line.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub agent: AgentConfig,
    pub transport: TransportConfig,
    pub watchers: WatchersConfig,
    pub pollers: PollersConfig,
    pub health: HealthConfig,
}

/// Agent identity section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Source attribute stamped on every envelope.
    pub source: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            source: "wkp-agent".to_string(),
        }
    }
}

/// Collector endpoint section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub url: Option<Url>,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchersConfig {
    /// Watcher forwarding core/v1 Events.
    pub events: WatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub workers: usize,
    pub max_retries: u32,
    pub cache_sync_timeout_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: 1,
            max_retries: 5,
            cache_sync_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollersConfig {
    pub cluster_info_enabled: bool,
    pub cluster_info_interval_secs: u64,
    pub flux_info_enabled: bool,
    pub flux_info_interval_secs: u64,
}

impl Default for PollersConfig {
    fn default() -> Self {
        Self {
            cluster_info_enabled: true,
            cluster_info_interval_secs: 10,
            flux_info_enabled: true,
            flux_info_interval_secs: 10,
        }
    }
}

/// Health endpoint section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    pub listen: SocketAddr,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[agent]
source = "cluster-a"

[transport]
url = "http://collector:8080/events"
timeout_secs = 5

[watchers.events]
enabled = true
workers = 4
cache_sync_timeout_secs = 30

[pollers]
cluster_info_interval_secs = 60
flux_info_enabled = false

[health]
listen = "127.0.0.1:9090"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.source, "cluster-a");
        assert_eq!(
            config.transport.url.unwrap().as_str(),
            "http://collector:8080/events"
        );
        assert_eq!(config.transport.timeout_secs, 5);
        assert_eq!(config.watchers.events.workers, 4);
        assert_eq!(config.watchers.events.max_retries, 5);
        assert_eq!(config.pollers.cluster_info_interval_secs, 60);
        assert!(config.pollers.cluster_info_enabled);
        assert!(!config.pollers.flux_info_enabled);
        assert_eq!(config.health.listen.port(), 9090);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.agent.source, "wkp-agent");
        assert!(config.transport.url.is_none());
        assert_eq!(config.transport.timeout_secs, 30);
        assert!(config.watchers.events.enabled);
        assert_eq!(config.watchers.events.cache_sync_timeout_secs, 60);
        assert_eq!(config.pollers.flux_info_interval_secs, 10);
        assert_eq!(config.health.listen.port(), 8080);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let toml_str = r#"
[transport]
url = "not a url"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
