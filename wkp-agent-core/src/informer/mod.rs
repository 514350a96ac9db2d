//! Informers observe Kubernetes objects and notify the watcher of changes.
//!
//! An informer is responsible for:
//! - Listing and watching its resource type
//! - Keeping a local cache of what it has seen
//! - Turning observed changes into Added/Updated/Deleted notifications
//! - Reporting when its initial list has been fully delivered

pub mod cache;
pub mod kube_informer;

pub use cache::LocalCache;
pub use kube_informer::KubeInformer;

use crate::events::{ChangeEvent, ChangeType};
use crate::queue::WorkQueue;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error};

/// Errors computing the queue key of an object.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("object has no name")]
    MissingName,
}

/// Objects that can be addressed by a `namespace/name` queue key.
pub trait ObjectKey {
    fn object_key(&self) -> Result<String, KeyError>;
}

impl<K: kube::Resource> ObjectKey for K {
    fn object_key(&self) -> Result<String, KeyError> {
        let meta = self.meta();
        let name = meta.name.as_deref().ok_or(KeyError::MissingName)?;
        match meta.namespace.as_deref() {
            Some(namespace) if !namespace.is_empty() => Ok(format!("{namespace}/{name}")),
            _ => Ok(name.to_string()),
        }
    }
}

/// Handle an informer uses to push notifications into a watcher's queue.
pub struct Notifier<K> {
    queue: WorkQueue<K>,
}

impl<K> Clone for Notifier<K> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<K: ObjectKey> Notifier<K> {
    pub fn new(queue: WorkQueue<K>) -> Self {
        Self { queue }
    }

    /// Enqueue a change of `object`.
    ///
    /// Objects without a usable key are logged and dropped.
    pub fn notify(&self, change_type: ChangeType, object: Arc<K>) {
        let key = match object.object_key() {
            Ok(key) => key,
            Err(e) => {
                error!(error = %e, change_type = %change_type, "Dropping notification without a key");
                return;
            }
        };

        debug!(key = %key, change_type = %change_type, "Enqueueing notification");
        self.queue.add(ChangeEvent::new(key, change_type, object));
    }
}

/// Source of change notifications for one resource type.
#[async_trait]
pub trait Informer: Send + Sync + 'static {
    type Object: ObjectKey + Send + Sync + 'static;

    /// List and watch until shutdown is signalled, notifying every change.
    async fn run(&self, notifier: Notifier<Self::Object>, shutdown_rx: watch::Receiver<bool>);

    /// Whether the initial list has been delivered to the notifier.
    fn has_synced(&self) -> bool;
}
