//! Keyed Registry of Page Caches
//!
//! Maps listing keys to shared [`PageCache`] instances. Lookups of existing
//! keys are lock-free; construction of a missing key happens at most once,
//! under a registry-wide lock.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use super::cache::PageCache;
use crate::error::Result;

/// Owned registry of page caches keyed by `K`
pub struct KeyedRegistry<K, T> {
    caches: DashMap<K, Arc<PageCache<T>>>,
    construction: AsyncMutex<()>,
}

impl<K, T> KeyedRegistry<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
            construction: AsyncMutex::new(()),
        }
    }

    /// Return the cache for `key`, building it with `factory` if absent.
    ///
    /// The factory runs exactly once per key across concurrent first
    /// accesses. A failing factory inserts nothing; the next call retries.
    pub async fn get_or_create<F, Fut>(&self, key: K, factory: F) -> Result<Arc<PageCache<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PageCache<T>>>,
    {
        if let Some(cache) = self.get(&key) {
            return Ok(cache);
        }

        let _guard = self.construction.lock().await;
        if let Some(cache) = self.get(&key) {
            return Ok(cache);
        }

        let cache = Arc::new(factory().await?);
        debug!(key = ?key, total = cache.total_count(), "created page cache");
        self.caches.insert(key, Arc::clone(&cache));
        Ok(cache)
    }

    /// Existing cache for `key`, if any
    pub fn get(&self, key: &K) -> Option<Arc<PageCache<T>>> {
        self.caches.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Forget `key`. Holders of the old instance keep using it.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.caches.remove(key).is_some();
        if removed {
            debug!(key = ?key, "removed page cache");
        }
        removed
    }

    /// Forget every key
    pub fn invalidate_all(&self) {
        let count = self.caches.len();
        self.caches.clear();
        debug!(count, "removed all page caches");
    }

    pub fn contains(&self, key: &K) -> bool {
        self.caches.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.caches.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<K, T> Default for KeyedRegistry<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::paged::fetcher::InMemoryListing;
    use crate::paged::policy::FreshnessPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn build(total: usize) -> Result<PageCache<String>> {
        let source = Arc::new(InMemoryListing::new(
            (0..total).map(|i| format!("item-{}", i)).collect(),
            10,
        ));
        PageCache::from_first_page(source.first_page(), FreshnessPolicy::NO_REVALIDATION, source)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_instance() {
        let registry: KeyedRegistry<&str, String> = KeyedRegistry::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let factory = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            build(20)
        };

        let first = registry.get_or_create("a", factory).await.unwrap();
        let second = registry.get_or_create("a", factory).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_access_runs_factory_once() {
        let registry: Arc<KeyedRegistry<u32, String>> = Arc::new(KeyedRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let registry = registry.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    registry
                        .get_or_create(7, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            build(30)
                        })
                        .await
                })
            })
            .collect();

        let caches: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(caches.iter().all(|cache| Arc::ptr_eq(cache, &caches[0])));
    }

    #[tokio::test]
    async fn test_factory_error_inserts_nothing() {
        let registry: KeyedRegistry<&str, String> = KeyedRegistry::new();

        let result = registry
            .get_or_create("a", || async { Err(Error::Config("unreachable upstream".into())) })
            .await;
        assert!(result.is_err());
        assert!(!registry.contains(&"a"));

        registry.get_or_create("a", || async { build(5) }).await.unwrap();
        assert!(registry.contains(&"a"));
    }

    #[tokio::test]
    async fn test_invalidate_key_keeps_existing_holders() {
        let registry: KeyedRegistry<&str, String> = KeyedRegistry::new();

        let old = registry.get_or_create("a", || async { build(20) }).await.unwrap();
        assert!(registry.invalidate(&"a"));
        assert!(!registry.invalidate(&"a"));

        assert_eq!(old.get(15).await.unwrap().as_deref(), Some("item-15"));

        let new = registry.get_or_create("a", || async { build(20) }).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let registry: KeyedRegistry<u32, String> = KeyedRegistry::new();
        for key in 0..5 {
            registry.get_or_create(key, || async { build(10) }).await.unwrap();
        }
        assert_eq!(registry.len(), 5);

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);

        registry.invalidate_all();
        assert!(registry.is_empty());
    }
}
