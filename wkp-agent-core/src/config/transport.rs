//! Transport configuration.

use std::time::Duration;
use url::Url;

/// Default timeout of a single delivery request.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how envelopes are delivered.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Collector endpoint receiving CloudEvents over HTTP.
    pub url: Url,
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: DEFAULT_TRANSPORT_TIMEOUT,
        }
    }
}
