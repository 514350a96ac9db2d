//! EventSender.
//!
//! The EventSender is responsible for:
//! - Wrapping a payload into a fresh `EventEnvelope` per attempt
//! - Handing the envelope to the configured transport
//! - Turning the delivery outcome into a uniform `SendError`
//!
//! It never retries; watchers retry through their queue and pollers simply
//! wait for the next tick.

use crate::transport::{DeliveryOutcome, Transport};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use wkp_agent_sdk::{EventEnvelope, EventPayload};

/// Errors that can occur while sending an event.
#[derive(Debug, Error)]
pub enum SendError {
    /// The payload could not be serialized; nothing was sent.
    #[error("failed to encode {event_type} event: {source}")]
    Encode {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The transport did not deliver the envelope.
    #[error("failed to deliver {event_type} event {id}: {reason}")]
    Delivery {
        event_type: &'static str,
        id: Uuid,
        reason: String,
    },
}

/// Publishes payloads as envelopes tagged with this agent's source.
#[derive(Clone)]
pub struct EventSender {
    source: String,
    transport: Arc<dyn Transport>,
}

impl EventSender {
    pub fn new(source: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            source: source.into(),
            transport,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Send one payload, making a single delivery attempt.
    pub async fn send<P: EventPayload>(&self, payload: &P) -> Result<(), SendError> {
        let envelope =
            EventEnvelope::new(self.source.as_str(), payload).map_err(|source| SendError::Encode {
                event_type: P::EVENT_TYPE,
                source,
            })?;

        let reason = match self.transport.send(&envelope).await {
            DeliveryOutcome::Delivered => {
                debug!(id = %envelope.id(), event_type = P::EVENT_TYPE, "Event delivered");
                return Ok(());
            }
            DeliveryOutcome::Undelivered(reason) => reason,
            DeliveryOutcome::TransportError(e) => e.to_string(),
        };

        Err(SendError::Delivery {
            event_type: P::EVENT_TYPE,
            id: envelope.id(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ping {
        seq: u32,
    }

    impl EventPayload for Ping {
        const EVENT_TYPE: &'static str = "Ping";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Broken {
        by_pair: HashMap<(u8, u8), u8>,
    }

    impl EventPayload for Broken {
        const EVENT_TYPE: &'static str = "Broken";
    }

    enum Mode {
        Deliver,
        Reject,
        Fail,
    }

    struct FixedTransport {
        mode: Mode,
        sent: Mutex<Vec<EventEnvelope>>,
    }

    impl FixedTransport {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(&self, envelope: &EventEnvelope) -> DeliveryOutcome {
            self.sent.lock().unwrap().push(envelope.clone());
            match self.mode {
                Mode::Deliver => DeliveryOutcome::Delivered,
                Mode::Reject => DeliveryOutcome::Undelivered("status 503: busy".to_string()),
                Mode::Fail => DeliveryOutcome::TransportError(TransportError::Time(
                    time::error::Format::InvalidComponent("offset_hour"),
                )),
            }
        }
    }

    #[tokio::test]
    async fn test_each_send_builds_a_fresh_envelope() {
        let transport = FixedTransport::new(Mode::Deliver);
        let sender = EventSender::new("wkp-agent", transport.clone());

        sender.send(&Ping { seq: 1 }).await.unwrap();
        sender.send(&Ping { seq: 1 }).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].id(), sent[1].id());
        assert_eq!(sent[0].body(), sent[1].body());
        assert_eq!(sent[0].source(), "wkp-agent");
        assert_eq!(sent[0].event_type(), "Ping");
    }

    #[tokio::test]
    async fn test_undelivered_and_transport_errors_are_delivery_errors() {
        for mode in [Mode::Reject, Mode::Fail] {
            let sender = EventSender::new("wkp-agent", FixedTransport::new(mode));
            let err = sender.send(&Ping { seq: 1 }).await.unwrap_err();
            assert!(matches!(err, SendError::Delivery { event_type: "Ping", .. }));
        }
    }

    #[tokio::test]
    async fn test_encode_error_skips_transport() {
        let transport = FixedTransport::new(Mode::Deliver);
        let sender = EventSender::new("wkp-agent", transport.clone());

        let mut by_pair = HashMap::new();
        by_pair.insert((1, 2), 3);
        let err = sender.send(&Broken { by_pair }).await.unwrap_err();

        assert!(matches!(err, SendError::Encode { event_type: "Broken", .. }));
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
