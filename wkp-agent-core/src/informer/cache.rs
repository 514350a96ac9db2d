//! Local object cache backing an informer.
//!
//! Watch events from `kube::runtime::watcher` are folded into the cache and
//! translated into notifications. A relist (`Init` .. `InitDone`) is diffed
//! against the cache so that objects which vanished while the watch was down
//! still produce a `Deleted` notification.

use crate::events::ChangeType;
use crate::informer::{Notifier, ObjectKey};
use kube::runtime::watcher;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

pub struct LocalCache<K> {
    state: Mutex<CacheState<K>>,
    synced: AtomicBool,
}

struct CacheState<K> {
    objects: HashMap<String, Arc<K>>,
    /// Keys seen since the last `Init`, while a relist is in progress.
    relist: Option<HashSet<String>>,
}

impl<K> Default for LocalCache<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CacheState {
                objects: HashMap::new(),
                relist: None,
            }),
            synced: AtomicBool::new(false),
        }
    }
}

impl<K: kube::Resource> LocalCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True once the first full list has been applied.
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply one watch event and notify the resulting changes.
    pub fn handle(&self, event: watcher::Event<K>, notifier: &Notifier<K>) {
        match event {
            watcher::Event::Init => {
                debug!("Relist started");
                self.lock().relist = Some(HashSet::new());
            }
            watcher::Event::InitApply(object) => self.apply(object, true, notifier),
            watcher::Event::InitDone => self.finish_relist(notifier),
            watcher::Event::Apply(object) => self.apply(object, false, notifier),
            watcher::Event::Delete(object) => self.delete(object, notifier),
        }
    }

    fn apply(&self, object: K, relisting: bool, notifier: &Notifier<K>) {
        let Some(key) = key_of(&object) else {
            return;
        };
        let object = Arc::new(object);

        let change_type = {
            let mut state = self.lock();
            if relisting {
                if let Some(seen) = state.relist.as_mut() {
                    seen.insert(key.clone());
                }
            }
            let previous = state.objects.insert(key, Arc::clone(&object));
            match previous {
                None => Some(ChangeType::Added),
                // An unchanged object listed again carries nothing new.
                Some(previous)
                    if relisting
                        && previous.meta().resource_version.is_some()
                        && previous.meta().resource_version == object.meta().resource_version =>
                {
                    None
                }
                Some(_) => Some(ChangeType::Updated),
            }
        };

        if let Some(change_type) = change_type {
            notifier.notify(change_type, object);
        }
    }

    fn delete(&self, object: K, notifier: &Notifier<K>) {
        let Some(key) = key_of(&object) else {
            return;
        };
        self.lock().objects.remove(&key);
        notifier.notify(ChangeType::Deleted, Arc::new(object));
    }

    fn finish_relist(&self, notifier: &Notifier<K>) {
        let vanished: Vec<Arc<K>> = {
            let mut state = self.lock();
            let Some(seen) = state.relist.take() else {
                return;
            };
            let gone: Vec<String> = state
                .objects
                .keys()
                .filter(|key| !seen.contains(*key))
                .cloned()
                .collect();
            gone.iter()
                .filter_map(|key| state.objects.remove(key))
                .collect()
        };

        for object in vanished {
            notifier.notify(ChangeType::Deleted, object);
        }

        if !self.synced.swap(true, Ordering::AcqRel) {
            debug!(objects = self.len(), "Initial list synced");
        }
    }
}

fn key_of<K: kube::Resource>(object: &K) -> Option<String> {
    match object.object_key() {
        Ok(key) => Some(key),
        Err(e) => {
            error!(error = %e, "Ignoring watch event for object without a key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WorkQueue;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str, version: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn drain(queue: &WorkQueue<ConfigMap>) -> Vec<(String, ChangeType)> {
        let mut seen = Vec::new();
        while !queue.is_empty() {
            let next = futures_util::FutureExt::now_or_never(queue.get())
                .flatten()
                .unwrap();
            seen.push((next.key().to_string(), next.change_type()));
            queue.done(&next);
        }
        seen
    }

    #[tokio::test]
    async fn test_initial_list_marks_synced() {
        let queue = WorkQueue::default();
        let notifier = Notifier::new(queue.clone());
        let cache = LocalCache::new();

        cache.handle(watcher::Event::Init, &notifier);
        cache.handle(watcher::Event::InitApply(config_map("a", "1")), &notifier);
        assert!(!cache.has_synced());
        cache.handle(watcher::Event::InitDone, &notifier);

        assert!(cache.has_synced());
        assert_eq!(cache.len(), 1);
        assert_eq!(drain(&queue), vec![("default/a".to_string(), ChangeType::Added)]);
    }

    #[tokio::test]
    async fn test_apply_and_delete() {
        let queue = WorkQueue::default();
        let notifier = Notifier::new(queue.clone());
        let cache = LocalCache::new();

        cache.handle(watcher::Event::Apply(config_map("a", "1")), &notifier);
        cache.handle(watcher::Event::Apply(config_map("a", "2")), &notifier);
        cache.handle(watcher::Event::Delete(config_map("a", "2")), &notifier);

        assert!(cache.is_empty());
        assert_eq!(
            drain(&queue),
            vec![
                ("default/a".to_string(), ChangeType::Added),
                ("default/a".to_string(), ChangeType::Updated),
                ("default/a".to_string(), ChangeType::Deleted),
            ]
        );
    }

    #[tokio::test]
    async fn test_relist_reports_vanished_and_skips_unchanged() {
        let queue = WorkQueue::default();
        let notifier = Notifier::new(queue.clone());
        let cache = LocalCache::new();

        cache.handle(watcher::Event::Init, &notifier);
        cache.handle(watcher::Event::InitApply(config_map("a", "1")), &notifier);
        cache.handle(watcher::Event::InitApply(config_map("b", "1")), &notifier);
        cache.handle(watcher::Event::InitDone, &notifier);
        drain(&queue);

        cache.handle(watcher::Event::Init, &notifier);
        cache.handle(watcher::Event::InitApply(config_map("a", "1")), &notifier);
        cache.handle(watcher::Event::InitDone, &notifier);

        assert_eq!(drain(&queue), vec![("default/b".to_string(), ChangeType::Deleted)]);
        assert!(cache.get("default/a").is_some());
        assert!(cache.get("default/b").is_none());
    }
}
