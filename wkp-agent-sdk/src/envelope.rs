//! CloudEvents-style envelope wrapping every payload sent by the agent.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use uuid::Uuid;

/// CloudEvents specification version carried by every envelope.
pub const CLOUDEVENTS_SPEC_VERSION: &str = "1.0";

/// Content type of JSON encoded payloads.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A payload that can be wrapped in an [`EventEnvelope`].
///
/// The event type is what the collector dispatches on, so it must be unique
/// per payload shape.
pub trait EventPayload: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;
    const CONTENT_TYPE: &'static str = JSON_CONTENT_TYPE;
}

/// Transport-agnostic event envelope.
///
/// Built once per send attempt and never mutated afterwards, which is why
/// the fields are only reachable through getters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    id: Uuid,
    event_type: String,
    occurred_at: OffsetDateTime,
    source: String,
    content_type: String,
    body: Bytes,
}

impl EventEnvelope {
    /// Wrap `payload` in a new envelope with a fresh id and the current time.
    pub fn new<P: EventPayload>(
        source: impl Into<String>,
        payload: &P,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(payload)?;
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: P::EVENT_TYPE.to_string(),
            occurred_at: OffsetDateTime::now_utc(),
            source: source.into(),
            content_type: P::CONTENT_TYPE.to_string(),
            body: Bytes::from(body),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> OffsetDateTime {
        self.occurred_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn spec_version(&self) -> &'static str {
        CLOUDEVENTS_SPEC_VERSION
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Heartbeat {
        sequence: u32,
    }

    impl EventPayload for Heartbeat {
        const EVENT_TYPE: &'static str = "Heartbeat";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Unserializable {
        by_pair: HashMap<(u8, u8), u8>,
    }

    impl EventPayload for Unserializable {
        const EVENT_TYPE: &'static str = "Unserializable";
    }

    #[test]
    fn test_envelope_wraps_payload() {
        let envelope = EventEnvelope::new("test", &Heartbeat { sequence: 7 }).unwrap();

        assert_eq!(envelope.event_type(), "Heartbeat");
        assert_eq!(envelope.source(), "test");
        assert_eq!(envelope.content_type(), JSON_CONTENT_TYPE);
        assert_eq!(envelope.spec_version(), "1.0");
        assert_eq!(
            envelope.data_as::<Heartbeat>().unwrap(),
            Heartbeat { sequence: 7 }
        );
    }

    #[test]
    fn test_envelopes_are_fresh() {
        let first = EventEnvelope::new("test", &Heartbeat { sequence: 1 }).unwrap();
        let second = EventEnvelope::new("test", &Heartbeat { sequence: 1 }).unwrap();

        assert_ne!(first.id(), second.id());
        assert!(second.occurred_at() >= first.occurred_at());
        assert_eq!(first.body(), second.body());
    }

    #[test]
    fn test_unserializable_payload_is_rejected() {
        let mut by_pair = HashMap::new();
        by_pair.insert((1, 2), 3);

        assert!(EventEnvelope::new("test", &Unserializable { by_pair }).is_err());
    }
}
