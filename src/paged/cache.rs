//! Page Cache - Revalidating Cache over One Paginated Listing
//!
//! Presents an upstream listing of unknown, possibly-changing size as one
//! addressable sequence. Pages are fetched on demand, at most once at a
//! time per page index, and kept until the freshness policy or a change in
//! the upstream's reported total drops them.
//!
//! # Locking
//!
//! ```text
//! revalidation (async) ──▶ page map (sync, never held across .await)
//! page lock    (async) ──▶ page map
//! ```
//!
//! - The revalidation lock serialises freshness decisions, so concurrent
//!   callers never duplicate a probe.
//! - One async lock per page index; only its holder fetches and writes that
//!   page. Cancelling a waiter leaves nothing behind.
//! - The page map lock guards pages, total and page size together: any
//!   write that changes total or page size clears every cached page first.
//! - Invalidation bumps a generation; a fetch that started before it hands
//!   its page to its own caller but never stores it.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use super::fetcher::{FetchedPage, PageFetcher};
use super::metrics::{CacheMetrics, MetricsSnapshot};
use super::policy::FreshnessPolicy;
use crate::error::{Error, Result};

type Page<T> = Arc<Vec<T>>;

/// Pages plus the (total, page size) pair they were computed under
struct PageMap<T> {
    pages: HashMap<usize, Page<T>>,
    total: usize,
    page_size: usize,
    page_size_confirmed: bool,
    /// Bumped by every invalidation; fetches started earlier do not store
    generation: u64,
}

impl<T> PageMap<T> {
    fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            1
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    /// Split a global index into (page, offset within page)
    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        if self.page_size == 0 {
            return None;
        }
        Some((index / self.page_size, index % self.page_size))
    }

    /// Adopt a reported total; returns true when it changed
    fn set_total(&mut self, total: usize) -> bool {
        if total == self.total {
            return false;
        }
        debug!(old = self.total, new = total, "upstream total changed, dropping cached pages");
        self.pages.clear();
        self.total = total;
        true
    }

    fn confirm_page_size(&mut self, page_size: usize) {
        if page_size != self.page_size {
            debug!(hint = self.page_size, page_size, "page size differs from hint");
            self.pages.clear();
            self.page_size = page_size;
        }
        self.page_size_confirmed = true;
    }

    /// Fold a fresh page 0 into total and page size.
    ///
    /// Returns true when this page confirmed the page size. A page 0 holding
    /// the whole listing keeps the size unconfirmed but grows it to the total.
    fn adopt_first_page(&mut self, len: usize, total: usize) -> bool {
        self.set_total(total);
        if self.page_size_confirmed || len == 0 {
            return false;
        }
        if len == total {
            if self.page_size != total {
                debug!(old = self.page_size, page_size = total, "single page listing resized");
                self.pages.clear();
                self.page_size = total;
            }
            return false;
        }
        self.confirm_page_size(len);
        true
    }
}

/// Revalidating page cache for one listing
pub struct PageCache<T> {
    /// Freshness rules
    policy: FreshnessPolicy,
    /// Upstream page source
    fetcher: Arc<dyn PageFetcher<T>>,
    /// Cached pages and sizing
    map: RwLock<PageMap<T>>,
    /// One fetch lock per page index
    page_locks: DashMap<usize, Arc<AsyncMutex<()>>>,
    /// Serialises soft probes and hard expiry
    revalidation: AsyncMutex<()>,
    /// Last successful freshness check
    last_validated: Mutex<Instant>,
    /// Metrics collector
    metrics: CacheMetrics,
}

impl<T> PageCache<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cache seeded with the first page of the listing.
    ///
    /// `page_size_hint` is usually the length of `initial_page`. When it
    /// equals `initial_total` the listing looked like a single page and the
    /// real page size is discovered on the first access beyond it.
    pub fn new<F>(
        initial_page: Vec<T>,
        initial_total: usize,
        page_size_hint: usize,
        policy: FreshnessPolicy,
        fetcher: F,
    ) -> Result<Self>
    where
        F: PageFetcher<T> + 'static,
    {
        Self::with_fetcher(
            initial_page,
            initial_total,
            page_size_hint,
            policy,
            Arc::new(fetcher),
        )
    }

    /// Create from an already shared fetcher
    pub fn with_fetcher(
        initial_page: Vec<T>,
        initial_total: usize,
        page_size_hint: usize,
        policy: FreshnessPolicy,
        fetcher: Arc<dyn PageFetcher<T>>,
    ) -> Result<Self> {
        if initial_total > 0 && page_size_hint == 0 {
            return Err(Error::InvalidPageSize {
                page_size: page_size_hint,
                total: initial_total,
            });
        }

        let mut pages = HashMap::new();
        pages.insert(0, Arc::new(initial_page));

        Ok(Self {
            policy,
            fetcher,
            map: RwLock::new(PageMap {
                pages,
                total: initial_total,
                page_size: page_size_hint,
                page_size_confirmed: page_size_hint != initial_total,
                generation: 0,
            }),
            page_locks: DashMap::new(),
            revalidation: AsyncMutex::new(()),
            last_validated: Mutex::new(Instant::now()),
            metrics: CacheMetrics::new(),
        })
    }

    /// Create from the result of fetching page 0, using its length as the hint
    pub fn from_first_page(
        first: FetchedPage<T>,
        policy: FreshnessPolicy,
        fetcher: Arc<dyn PageFetcher<T>>,
    ) -> Result<Self> {
        let hint = first.items.len();
        Self::with_fetcher(first.items, first.total, hint, policy, fetcher)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the item at a global offset, or `None` when out of range
    #[instrument(level = "trace", skip(self))]
    pub async fn get(&self, index: usize) -> Result<Option<T>> {
        let located = self.load(index).await?;
        Ok(located.and_then(|(page, offset)| page.get(offset).cloned()))
    }

    /// Get every index of `range` concurrently, in range order
    pub async fn get_range(&self, range: Range<usize>) -> Result<Vec<Option<T>>> {
        try_join_all(range.map(|index| self.get(index))).await
    }

    /// Make sure the page holding `index` is cached
    pub async fn preload(&self, index: usize) -> Result<()> {
        if self.policy.is_uncached() {
            return Ok(());
        }
        self.load(index).await.map(|_| ())
    }

    /// Preload every index of `range` concurrently
    #[instrument(skip(self))]
    pub async fn preload_range(&self, range: Range<usize>) -> Result<()> {
        if self.policy.is_uncached() {
            return Ok(());
        }
        try_join_all(range.map(|index| self.preload(index))).await?;
        Ok(())
    }

    /// Preload the whole listing as currently sized
    #[instrument(skip(self), fields(total = self.total_count()))]
    pub async fn preload_all(&self) -> Result<()> {
        self.preload_range(0..self.total_count()).await
    }

    /// Drop every cached page and restart the freshness clock
    pub fn invalidate(&self) {
        {
            let mut map = self.map.write();
            map.pages.clear();
            map.generation += 1;
        }
        self.page_locks.clear();
        *self.last_validated.lock() = Instant::now();
        self.metrics.record_invalidation();
        debug!("page cache invalidated");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Total item count as last reported upstream
    pub fn total_count(&self) -> usize {
        self.map.read().total
    }

    /// Current page size (hint until confirmed)
    pub fn page_size(&self) -> usize {
        self.map.read().page_size
    }

    pub fn is_page_size_confirmed(&self) -> bool {
        self.map.read().page_size_confirmed
    }

    /// Number of pages the current total spans
    pub fn total_pages(&self) -> usize {
        self.map.read().total_pages()
    }

    pub fn is_cached(&self, page: usize) -> bool {
        self.map.read().pages.contains_key(&page)
    }

    pub fn cached_pages(&self) -> usize {
        self.map.read().pages.len()
    }

    pub fn policy(&self) -> FreshnessPolicy {
        self.policy
    }

    /// Time since the last successful freshness check
    pub fn since_validated(&self) -> Duration {
        self.last_validated.lock().elapsed()
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Resolve `index` to its page, fetching the page if needed
    async fn load(&self, index: usize) -> Result<Option<(Page<T>, usize)>> {
        let uncached = self.policy.is_uncached();
        if !uncached {
            // Runs before the empty check so an emptied listing can come back
            self.revalidate().await?;
            if self.total_count() == 0 {
                self.reload_empty_listing().await?;
            }
        }
        if self.total_count() == 0 {
            return Ok(None);
        }

        self.ensure_page_size(index).await?;

        if uncached {
            let Some((page, offset)) = self.locate(index) else {
                return Ok(None);
            };
            self.metrics.record_miss();
            let items = self.fetch_and_store(page).await?;
            return Ok(items.map(|items| (items, offset)));
        }

        let Some((page, offset)) = self.locate(index) else {
            return Ok(None);
        };

        if let Some(items) = self.cached(page) {
            self.metrics.record_hit();
            trace!(page, index, "page cache hit");
            return Ok(Some((items, offset)));
        }

        let lock = self.page_lock(page);
        let _guard = lock.lock().await;

        // Another caller may have filled it while we waited
        if let Some(items) = self.cached(page) {
            self.metrics.record_hit();
            return Ok(Some((items, offset)));
        }

        self.metrics.record_miss();
        let items = self.fetch_and_store(page).await?;
        Ok(items.map(|items| (items, offset)))
    }

    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        self.map.read().locate(index)
    }

    fn generation(&self) -> u64 {
        self.map.read().generation
    }

    fn cached(&self, page: usize) -> Option<Page<T>> {
        self.map.read().pages.get(&page).cloned()
    }

    fn page_lock(&self, page: usize) -> Arc<AsyncMutex<()>> {
        self.page_locks
            .entry(page)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Confirm the page size before any arithmetic past the hinted first page
    async fn ensure_page_size(&self, index: usize) -> Result<()> {
        let (confirmed, page_size) = {
            let map = self.map.read();
            (map.page_size_confirmed, map.page_size)
        };
        if confirmed || index < page_size {
            return Ok(());
        }

        let lock = self.page_lock(0);
        let _guard = lock.lock().await;
        if self.is_page_size_confirmed() {
            return Ok(());
        }

        // Page 0 is the one page guaranteed full in a multi-page listing
        let generation = self.generation();
        let Some(probe) = self.fetch(0).await? else {
            return Ok(());
        };
        if probe.items.is_empty() {
            return Ok(());
        }

        let mut map = self.map.write();
        if map.page_size_confirmed || map.generation != generation {
            return Ok(());
        }
        self.store_first_page(&mut map, probe);
        Ok(())
    }

    /// Refetch page 0 of an empty listing once invalidation dropped it
    async fn reload_empty_listing(&self) -> Result<()> {
        if self.cached(0).is_some() {
            return Ok(());
        }

        let lock = self.page_lock(0);
        let _guard = lock.lock().await;
        if self.cached(0).is_some() {
            return Ok(());
        }

        let generation = self.generation();
        self.metrics.record_miss();
        let first = self.fetch(0).await?.unwrap_or_else(FetchedPage::empty);

        let mut map = self.map.write();
        if map.generation != generation {
            return Ok(());
        }
        debug!(total = first.total, "reloaded first page of empty listing");
        self.store_first_page(&mut map, first);
        Ok(())
    }

    /// Adopt a fresh page 0 and cache it
    fn store_first_page(&self, map: &mut PageMap<T>, first: FetchedPage<T>) {
        if map.adopt_first_page(first.items.len(), first.total) {
            self.metrics.record_page_size_confirmation();
            debug!(page_size = map.page_size, total = map.total, "page size confirmed");
        }
        if !self.policy.is_uncached() {
            map.pages.insert(0, Arc::new(first.items));
        }
    }

    /// Apply the freshness policy before a cache lookup
    async fn revalidate(&self) -> Result<()> {
        let _guard = self.revalidation.lock().await;
        let elapsed = self.last_validated.lock().elapsed();

        if self.policy.hard_expired(elapsed) {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "hard limit reached");
            self.metrics.record_hard_invalidation();
            self.invalidate();
            return Ok(());
        }

        if !self.policy.soft_expired(elapsed) {
            return Ok(());
        }

        let generation = self.generation();
        let Some(probe) = self.fetch(0).await? else {
            debug!("probe found no first page, keeping cache");
            return Ok(());
        };
        if probe.items.is_empty() && probe.total > 0 {
            debug!(total = probe.total, "probe returned an empty first page, keeping cache");
            return Ok(());
        }

        let changed = {
            let mut map = self.map.write();
            if map.generation != generation {
                debug!("cache invalidated during probe, discarding it");
                return Ok(());
            }
            let changed = probe.total != map.total
                || map
                    .pages
                    .get(&0)
                    .map_or(true, |cached| **cached != probe.items);

            if changed {
                map.pages.clear();
                self.store_first_page(&mut map, probe);
            }
            changed
        };

        self.metrics.record_probe(changed);
        debug!(
            changed,
            elapsed_ms = elapsed.as_millis() as u64,
            "soft limit probe complete"
        );
        *self.last_validated.lock() = Instant::now();
        Ok(())
    }

    /// Fetch a page and fold its result into the map
    async fn fetch_and_store(&self, page: usize) -> Result<Option<Page<T>>> {
        let generation = self.generation();
        let Some(FetchedPage { items, total }) = self.fetch(page).await? else {
            return Ok(None);
        };
        let store = !self.policy.is_uncached();

        let mut map = self.map.write();
        if map.generation != generation {
            // Invalidated mid-fetch: hand the page to this caller only
            trace!(page, "dropping page fetched before invalidation");
            let in_range = map.page_size > 0 && page < total.div_ceil(map.page_size);
            return Ok(in_range.then(|| Arc::new(items)));
        }
        if !map.page_size_confirmed && page > 0 && !items.is_empty() {
            map.confirm_page_size(items.len());
            self.metrics.record_page_size_confirmation();
        }
        map.set_total(total);

        if page >= map.total_pages() {
            // Remember the page is past the end so we stop asking
            if store {
                map.pages.insert(page, Arc::new(Vec::new()));
            }
            trace!(page, total = map.total, "page past end of listing");
            return Ok(None);
        }

        let items = Arc::new(items);
        if store {
            map.pages.insert(page, Arc::clone(&items));
        }
        Ok(Some(items))
    }

    async fn fetch(&self, page: usize) -> Result<Option<FetchedPage<T>>> {
        let start = Instant::now();
        let result = self.fetcher.fetch_page(page).await;
        let elapsed = start.elapsed();
        self.metrics.record_fetch(elapsed);

        match &result {
            Ok(Some(fetched)) => debug!(
                page,
                items = fetched.items.len(),
                total = fetched.total,
                elapsed_ms = elapsed.as_millis() as u64,
                "fetched page"
            ),
            Ok(None) => debug!(page, "upstream has no such page"),
            Err(e) => debug!(page, error = %e, "page fetch failed"),
        }
        result
    }
}

impl<T> fmt::Debug for PageCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let map = self.map.read();
        f.debug_struct("PageCache")
            .field("policy", &self.policy)
            .field("total", &map.total)
            .field("page_size", &map.page_size)
            .field("page_size_confirmed", &map.page_size_confirmed)
            .field("cached_pages", &map.pages.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
