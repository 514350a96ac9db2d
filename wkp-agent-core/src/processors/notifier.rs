//! Forwards Kubernetes events to the collector.

use crate::events::ChangeType;
use crate::processors::sender::{EventSender, SendError};
use crate::processors::watcher::ChangeHandler;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use std::sync::Arc;
use tracing::debug;
use wkp_agent_sdk::objects::KubernetesEvent;

/// Sends every observed core/v1 Event as a `KubernetesEvent` payload.
///
/// Delivery errors are returned so the watcher retries them.
#[derive(Clone)]
pub struct EventNotifier {
    token: String,
    sender: EventSender,
}

impl EventNotifier {
    pub fn new(token: impl Into<String>, sender: EventSender) -> Self {
        Self {
            token: token.into(),
            sender,
        }
    }
}

#[async_trait]
impl ChangeHandler<Event> for EventNotifier {
    type Error = SendError;

    async fn process(&self, change_type: ChangeType, resource: Arc<Event>) -> Result<(), SendError> {
        debug!(
            reason = resource.reason.as_deref().unwrap_or_default(),
            change_type = %change_type,
            "Forwarding Kubernetes event"
        );

        let payload = KubernetesEvent {
            token: self.token.clone(),
            change_type,
            event: Event::clone(&resource),
        };
        self.sender.send(&payload).await
    }
}
