//! Informer backed by `kube::runtime::watcher`.

use crate::informer::{Informer, LocalCache, Notifier};
use async_trait::async_trait;
use futures_util::StreamExt;
use kube::Api;
use kube::runtime::{WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tokio::sync::watch;
use tracing::{info, warn};

/// Lists and watches every object reachable through `api`.
///
/// Watch errors are retried by the watcher's default backoff; the informer
/// only stops when shutdown is signalled.
pub struct KubeInformer<K> {
    api: Api<K>,
    cache: LocalCache<K>,
}

impl<K> KubeInformer<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    pub fn new(api: Api<K>) -> Self {
        Self {
            api,
            cache: LocalCache::new(),
        }
    }
}

#[async_trait]
impl<K> Informer for KubeInformer<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
{
    type Object = K;

    async fn run(&self, notifier: Notifier<K>, mut shutdown_rx: watch::Receiver<bool>) {
        let kind = K::kind(&Default::default()).to_string();
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        info!(kind = %kind, "Informer started");

        let stream = watcher(self.api.clone(), watcher::Config::default()).default_backoff();
        let mut stream = std::pin::pin!(stream);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(kind = %kind, "Informer received shutdown signal");
                        break;
                    }
                }

                next = stream.next() => match next {
                    Some(Ok(event)) => self.cache.handle(event, &notifier),
                    Some(Err(e)) => warn!(kind = %kind, error = %e, "Watch failed, backing off"),
                    None => {
                        warn!(kind = %kind, "Watch stream ended");
                        break;
                    }
                },
            }
        }

        info!(kind = %kind, "Informer shutdown complete");
    }

    fn has_synced(&self) -> bool {
        self.cache.has_synced()
    }
}
