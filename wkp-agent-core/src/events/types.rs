//! Event type definitions for the watcher pipeline.

use std::sync::Arc;

pub use wkp_agent_sdk::objects::ChangeType;

/// Identity of a single queued notification.
///
/// Two notifications for the same object share a key but never a
/// generation, so retry history is tracked per notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemId {
    pub key: String,
    pub generation: u64,
}

/// A change observed on a watched object.
///
/// The resource is the object as it was when the notification fired, not
/// whatever the cache holds by the time a worker gets to it.
#[derive(Debug)]
pub struct ChangeEvent<K> {
    key: String,
    change_type: ChangeType,
    resource: Arc<K>,
    pub(crate) generation: u64,
}

impl<K> ChangeEvent<K> {
    /// Create an event that has not been enqueued yet.
    pub fn new(key: impl Into<String>, change_type: ChangeType, resource: Arc<K>) -> Self {
        Self {
            key: key.into(),
            change_type,
            resource,
            generation: 0,
        }
    }

    /// `namespace/name`, or just `name` for cluster-scoped objects.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    pub fn resource(&self) -> Arc<K> {
        Arc::clone(&self.resource)
    }

    /// Sequence number assigned by the queue, `0` before enqueueing.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn id(&self) -> ItemId {
        ItemId {
            key: self.key.clone(),
            generation: self.generation,
        }
    }
}

impl<K> Clone for ChangeEvent<K> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            change_type: self.change_type,
            resource: Arc::clone(&self.resource),
            generation: self.generation,
        }
    }
}
