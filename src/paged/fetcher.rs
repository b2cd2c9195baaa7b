//! Page Fetch Capability
//!
//! The only thing the cache knows about its upstream: "fetch page N, return
//! its items and the source's current total, or report that the page does
//! not exist".
//!
//! # Design
//!
//! - Pluggable async trait, implemented by site-specific layers
//! - `Ok(None)` is absence, not failure; failures are `Err` and are never
//!   re-interpreted by the cache
//! - [`InMemoryListing`] for tests and synthetic load

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::Result;

/// One upstream page plus the total count the upstream reported with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage<T> {
    /// Items on the page, in listing order
    pub items: Vec<T>,
    /// Total number of items in the whole listing
    pub total: usize,
}

impl<T> FetchedPage<T> {
    pub fn new(items: Vec<T>, total: usize) -> Self {
        Self { items, total }
    }

    /// Empty listing marker
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Page fetch capability trait
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    /// Fetch a page by zero-based index
    async fn fetch_page(&self, page: usize) -> Result<Option<FetchedPage<T>>>;
}

#[async_trait]
impl<T, F> PageFetcher<T> for Arc<F>
where
    F: PageFetcher<T> + ?Sized,
{
    async fn fetch_page(&self, page: usize) -> Result<Option<FetchedPage<T>>> {
        (**self).fetch_page(page).await
    }
}

/// Adapter turning an async closure into a [`PageFetcher`]
pub struct FnFetcher<T, F> {
    f: F,
    _item: PhantomData<fn() -> T>,
}

impl<T, F> FnFetcher<T, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> PageFetcher<T> for FnFetcher<T, F>
where
    T: Send + 'static,
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<FetchedPage<T>>>> + Send,
{
    async fn fetch_page(&self, page: usize) -> Result<Option<FetchedPage<T>>> {
        (self.f)(page).await
    }
}

/// Build a fetcher from an async closure
pub fn fetcher_fn<T, F, Fut>(f: F) -> FnFetcher<T, F>
where
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<FetchedPage<T>>>> + Send,
{
    FnFetcher::new(f)
}

/// In-memory paginated source
///
/// Serves fixed-size pages over a mutable item list. Pages past the end are
/// absent. Counts every fetch, overall and per page.
pub struct InMemoryListing<T> {
    items: RwLock<Vec<T>>,
    page_size: usize,
    latency: Duration,
    fetches: AtomicU64,
    per_page: DashMap<usize, u64>,
}

impl<T: Clone> InMemoryListing<T> {
    /// Create a new in-memory listing
    pub fn new(items: Vec<T>, page_size: usize) -> Self {
        Self {
            items: RwLock::new(items),
            page_size: page_size.max(1),
            latency: Duration::ZERO,
            fetches: AtomicU64::new(0),
            per_page: DashMap::new(),
        }
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total(&self) -> usize {
        self.items.read().len()
    }

    /// Page 0 as the upstream currently serves it, without counting a fetch
    pub fn first_page(&self) -> FetchedPage<T> {
        self.page(0).unwrap_or_else(FetchedPage::empty)
    }

    /// Replace the whole listing
    pub fn replace(&self, items: Vec<T>) {
        *self.items.write() = items;
    }

    /// Overwrite a single item; returns false when out of range
    pub fn set(&self, index: usize, item: T) -> bool {
        match self.items.write().get_mut(index) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Prepend an item, shifting every offset by one
    pub fn push_front(&self, item: T) {
        self.items.write().insert(0, item);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn fetches_for(&self, page: usize) -> u64 {
        self.per_page.get(&page).map(|c| *c).unwrap_or(0)
    }

    fn page(&self, page: usize) -> Option<FetchedPage<T>> {
        let items = self.items.read();
        let total = items.len();
        let start = page.checked_mul(self.page_size)?;

        if total == 0 && page == 0 {
            return Some(FetchedPage::empty());
        }
        if start >= total {
            return None;
        }

        let end = (start + self.page_size).min(total);
        Some(FetchedPage::new(items[start..end].to_vec(), total))
    }
}

#[async_trait]
impl<T> PageFetcher<T> for InMemoryListing<T>
where
    T: Clone + Send + Sync,
{
    async fn fetch_page(&self, page: usize) -> Result<Option<FetchedPage<T>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        *self.per_page.entry(page).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        Ok(self.page(page))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(total: usize, page_size: usize) -> InMemoryListing<String> {
        InMemoryListing::new((0..total).map(|i| format!("item-{}", i)).collect(), page_size)
    }

    #[tokio::test]
    async fn test_in_memory_pages() {
        let source = listing(25, 10);

        let page = source.fetch_page(0).await.unwrap().unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page.total, 25);
        assert_eq!(page.items[0], "item-0");

        let last = source.fetch_page(2).await.unwrap().unwrap();
        assert_eq!(last.items, vec!["item-20", "item-21", "item-22", "item-23", "item-24"]);

        assert!(source.fetch_page(3).await.unwrap().is_none());
        assert_eq!(source.fetch_count(), 3);
        assert_eq!(source.fetches_for(2), 1);
        assert_eq!(source.fetches_for(7), 0);
    }

    #[tokio::test]
    async fn test_in_memory_empty_listing() {
        let source = listing(0, 10);

        let page = source.fetch_page(0).await.unwrap().unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 0);
        assert!(source.fetch_page(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_mutation() {
        let source = listing(5, 5);
        assert!(source.set(0, "changed".to_string()));
        assert!(!source.set(9, "nope".to_string()));
        source.push_front("new".to_string());

        let first = source.first_page();
        assert_eq!(first.total, 6);
        assert_eq!(first.items[0], "new");
        assert_eq!(first.items[1], "changed");
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_fn_fetcher() {
        let fetcher = fetcher_fn(|page: usize| async move {
            if page < 2 {
                Ok(Some(FetchedPage::new(vec![page * 10], 20)))
            } else {
                Ok(None)
            }
        });

        assert_eq!(fetcher.fetch_page(1).await.unwrap().unwrap().items, vec![10]);
        assert!(fetcher.fetch_page(2).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_latency() {
        let source = listing(10, 5).with_latency(Duration::from_millis(100));
        let start = tokio::time::Instant::now();
        source.fetch_page(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
