//! Wire types for the wkp-agent.
//!
//! Everything the agent puts on the message bus is defined here so that the
//! collector on the other side can decode it with the same types.

#![forbid(unsafe_code)]

pub mod envelope;
pub mod objects;

pub use envelope::{CLOUDEVENTS_SPEC_VERSION, EventEnvelope, EventPayload, JSON_CONTENT_TYPE};
