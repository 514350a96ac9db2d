//! Configuration module for wkp-agent.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{PollerConfig, RuntimeConfig, TransportConfig, WatcherConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable holding the agent token.
pub const TOKEN_ENV_VAR: &str = "WKP_AGENT_TOKEN";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("WKP_AGENT_TOKEN environment variable not set")]
    MissingToken,
}

/// Values given on the command line, taking precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub collector_url: Option<Url>,
    pub health_listen: Option<SocketAddr>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: CliOverrides,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, overrides: CliOverrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate and build the runtime configuration
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let file_config: FileConfig = toml::from_str(&config_content)?;
        self.build(file_config)
    }

    fn build(&self, mut file_config: FileConfig) -> Result<RuntimeConfig, ConfigError> {
        if let Some(url) = &self.overrides.collector_url {
            file_config.transport.url = Some(url.clone());
        }
        if let Some(listen) = self.overrides.health_listen {
            file_config.health.listen = listen;
        }

        let url = file_config.transport.url.clone().ok_or_else(|| {
            ConfigError::ValidationError("transport.url must be set".to_string())
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "transport.url must be http or https, got {}",
                url.scheme()
            )));
        }
        if file_config.transport.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "transport.timeout_secs must be non-zero".to_string(),
            ));
        }

        let events = &file_config.watchers.events;
        let events_watcher = if events.enabled {
            if events.workers == 0 {
                return Err(ConfigError::ValidationError(
                    "watchers.events.workers must be non-zero".to_string(),
                ));
            }
            Some(WatcherConfig {
                workers: events.workers,
                max_retries: events.max_retries,
                cache_sync_timeout: Duration::from_secs(events.cache_sync_timeout_secs),
            })
        } else {
            None
        };

        let pollers = &file_config.pollers;
        let cluster_info = poller(
            "cluster-info",
            pollers.cluster_info_enabled,
            pollers.cluster_info_interval_secs,
        )?;
        let flux_info = poller(
            "flux-info",
            pollers.flux_info_enabled,
            pollers.flux_info_interval_secs,
        )?;

        Ok(RuntimeConfig {
            source: file_config.agent.source,
            transport: TransportConfig {
                url,
                timeout: Duration::from_secs(file_config.transport.timeout_secs),
            },
            events_watcher,
            cluster_info,
            flux_info,
            health_listen: file_config.health.listen,
        })
    }
}

fn poller(
    name: &str,
    enabled: bool,
    interval_secs: u64,
) -> Result<Option<PollerConfig>, ConfigError> {
    if !enabled {
        return Ok(None);
    }
    if interval_secs == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{name} interval must be non-zero"
        )));
    }
    Ok(Some(PollerConfig::new(
        name,
        Duration::from_secs(interval_secs),
    )))
}

/// Get the agent token from the environment.
pub fn get_agent_token() -> Result<String, ConfigError> {
    std::env::var(TOKEN_ENV_VAR)
        .ok()
        .filter(|token| !token.is_empty())
        .ok_or(ConfigError::MissingToken)
}
