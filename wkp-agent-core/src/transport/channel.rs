//! In-process transport over a tokio channel.

use crate::transport::{DeliveryOutcome, Transport};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use wkp_agent_sdk::EventEnvelope;

/// Sender half of an in-process envelope channel.
pub type EnvelopeSender = mpsc::Sender<EventEnvelope>;

/// Hands envelopes to a local consumer without ever waiting on it.
///
/// A full or closed channel is reported as undelivered.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: EnvelopeSender,
}

impl ChannelTransport {
    pub fn new(tx: EnvelopeSender) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome {
        match self.tx.try_send(envelope.clone()) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => DeliveryOutcome::Undelivered("channel full".to_string()),
            Err(TrySendError::Closed(_)) => {
                DeliveryOutcome::Undelivered("channel closed".to_string())
            }
        }
    }
}
