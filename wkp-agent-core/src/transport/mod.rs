//! Transports move envelopes from the agent to the collector.
//!
//! A transport makes a single, best-effort delivery attempt and reports how
//! it went. Retrying is left to whoever owns the payload.

pub mod channel;
pub mod http;

pub use channel::{ChannelTransport, EnvelopeSender};
pub use http::HttpTransport;

use async_trait::async_trait;
use thiserror::Error;
use wkp_agent_sdk::EventEnvelope;

/// Errors raised by the transport itself rather than by the collector.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Envelope timestamp could not be rendered
    #[error("timestamp formatting error: {0}")]
    Time(#[from] time::error::Format),
}

/// Result of one delivery attempt.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    /// The collector was reached but did not accept the envelope.
    Undelivered(String),
    TransportError(TransportError),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome;
}
