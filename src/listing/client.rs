//! Listing Client
//!
//! Hands out one shared [`PageCache`] per [`ListingKey`], built on first use
//! from the listing's first upstream page.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::key::{ListingKey, ListingKind};
use super::source::ListingSource;
use crate::error::Result;
use crate::paged::{FetchedPage, FreshnessPolicy, KeyedRegistry, PageCache, PageFetcher};

/// Default freshness policy per listing kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingPolicies {
    pub board: FreshnessPolicy,
    pub board_msg: FreshnessPolicy,
    pub portfolio: FreshnessPolicy,
    pub portfolio_submissions: FreshnessPolicy,
}

impl ListingPolicies {
    /// Same policy for every kind
    pub fn uniform(policy: FreshnessPolicy) -> Self {
        Self {
            board: policy,
            board_msg: policy,
            portfolio: policy,
            portfolio_submissions: policy,
        }
    }

    pub fn policy_for(&self, kind: ListingKind) -> FreshnessPolicy {
        match kind {
            ListingKind::Board => self.board,
            ListingKind::BoardMsg => self.board_msg,
            ListingKind::Portfolio => self.portfolio,
            ListingKind::PortfolioSubmissions => self.portfolio_submissions,
        }
    }

    pub fn set(&mut self, kind: ListingKind, policy: FreshnessPolicy) {
        let slot = match kind {
            ListingKind::Board => &mut self.board,
            ListingKind::BoardMsg => &mut self.board_msg,
            ListingKind::Portfolio => &mut self.portfolio,
            ListingKind::PortfolioSubmissions => &mut self.portfolio_submissions,
        };
        *slot = policy;
    }
}

impl Default for ListingPolicies {
    fn default() -> Self {
        Self {
            board: FreshnessPolicy::BOARD,
            board_msg: FreshnessPolicy::BOARD_MSG,
            portfolio: FreshnessPolicy::PORTFOLIO,
            portfolio_submissions: FreshnessPolicy::PORTFOLIO_LIST,
        }
    }
}

/// Fetcher bound to one key of a source
struct KeyedFetcher<S> {
    source: Arc<S>,
    key: ListingKey,
}

#[async_trait]
impl<S: ListingSource> PageFetcher<S::Item> for KeyedFetcher<S> {
    async fn fetch_page(&self, page: usize) -> Result<Option<FetchedPage<S::Item>>> {
        self.key.fetch(self.source.as_ref(), page).await
    }
}

/// Cached access to every listing of a source
pub struct ListingClient<S: ListingSource> {
    source: Arc<S>,
    policies: ListingPolicies,
    registry: KeyedRegistry<ListingKey, S::Item>,
}

impl<S: ListingSource> ListingClient<S> {
    /// Create a client with the default policies
    pub fn new(source: S) -> Self {
        Self::with_policies(Arc::new(source), ListingPolicies::default())
    }

    pub fn with_policies(source: Arc<S>, policies: ListingPolicies) -> Self {
        Self {
            source,
            policies,
            registry: KeyedRegistry::new(),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn policies(&self) -> &ListingPolicies {
        &self.policies
    }

    /// Cache for `key` under its kind's default policy
    pub async fn list(&self, key: ListingKey) -> Result<Arc<PageCache<S::Item>>> {
        let policy = self.policies.policy_for(key.kind());
        self.list_with_policy(key, policy).await
    }

    /// Cache for `key`; `policy` applies only if this call creates it
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn list_with_policy(
        &self,
        key: ListingKey,
        policy: FreshnessPolicy,
    ) -> Result<Arc<PageCache<S::Item>>> {
        let fetcher = KeyedFetcher {
            source: Arc::clone(&self.source),
            key: key.clone(),
        };
        self.registry
            .get_or_create(key, || async move {
                let first = fetcher
                    .fetch_page(0)
                    .await?
                    .unwrap_or_else(FetchedPage::empty);
                debug!(
                    items = first.len(),
                    total = first.total,
                    %policy,
                    "fetched first page"
                );
                PageCache::from_first_page(first, policy, Arc::new(fetcher))
            })
            .await
    }

    /// Drop the cache for `key`; the next `list` rebuilds it
    pub fn invalidate(&self, key: &ListingKey) -> bool {
        self.registry.invalidate(key)
    }

    pub fn invalidate_all(&self) {
        self.registry.invalidate_all();
    }

    /// Number of listings currently cached
    pub fn cached_listings(&self) -> usize {
        self.registry.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::listing::key::{Category, DbId};
    use crate::listing::source::InMemorySource;
    use crate::paged::InMemoryListing;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn listing(total: usize) -> Arc<InMemoryListing<String>> {
        Arc::new(InMemoryListing::new(
            (0..total).map(|i| format!("post-{}", i)).collect(),
            10,
        ))
    }

    fn source_with(keys: &[(ListingKey, usize)]) -> InMemorySource<String> {
        let source = InMemorySource::new();
        for (key, total) in keys {
            source.insert(key.clone(), listing(*total));
        }
        source
    }

    /// Records upstream page numbers and fails board 99
    struct RecordingSource {
        calls: Mutex<Vec<(ListingKind, usize)>>,
    }

    impl RecordingSource {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn page(&self, kind: ListingKind, page: usize) -> Result<Option<FetchedPage<u32>>> {
            self.calls.lock().push((kind, page));
            if page > 3 {
                return Ok(None);
            }
            let start = (page as u32 - 1) * 10;
            Ok(Some(FetchedPage::new((start..start + 10).collect(), 30)))
        }
    }

    #[async_trait]
    impl ListingSource for RecordingSource {
        type Item = u32;

        async fn board(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<u32>>> {
            if db == DbId(99) {
                return Err(Error::upstream(anyhow::anyhow!("board 99 is gone")));
            }
            self.page(ListingKind::Board, page)
        }

        async fn board_msg(&self, _db: DbId, page: usize) -> Result<Option<FetchedPage<u32>>> {
            self.page(ListingKind::BoardMsg, page)
        }

        async fn portfolio(&self, _db: DbId, page: usize) -> Result<Option<FetchedPage<u32>>> {
            self.page(ListingKind::Portfolio, page)
        }

        async fn portfolio_submissions(
            &self,
            _db: DbId,
            _category: &Category,
            page: usize,
        ) -> Result<Option<FetchedPage<u32>>> {
            self.page(ListingKind::PortfolioSubmissions, page)
        }
    }

    #[tokio::test]
    async fn test_list_builds_once_per_key() {
        let key = ListingKey::board(1);
        let client = ListingClient::new(source_with(&[(key.clone(), 25)]));

        let first = client.list(key.clone()).await.unwrap();
        let second = client.list(key.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.total_count(), 25);
        assert_eq!(first.get(24).await.unwrap().as_deref(), Some("post-24"));

        let upstream = client.source().listing(&key).unwrap();
        // First page plus pages 1 and 2 for index 24
        assert_eq!(upstream.fetches_for(0), 1);
        assert_eq!(upstream.fetches_for(2), 1);
    }

    #[tokio::test]
    async fn test_pages_are_one_based_upstream() {
        let client = ListingClient::new(RecordingSource::new());
        let cache = client.list(ListingKey::portfolio(2)).await.unwrap();

        assert_eq!(cache.get(15).await.unwrap(), Some(15));
        let calls = client.source().calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                (ListingKind::Portfolio, 1),
                (ListingKind::Portfolio, 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_kinds_are_distinct_listings() {
        let client = ListingClient::new(RecordingSource::new());

        let board = client.list(ListingKey::board(1)).await.unwrap();
        let msg = client.list(ListingKey::board_msg(1)).await.unwrap();
        assert!(!Arc::ptr_eq(&board, &msg));
        assert_eq!(client.cached_listings(), 2);
    }

    #[tokio::test]
    async fn test_default_policy_per_kind() {
        let client = ListingClient::new(RecordingSource::new());

        let board = client.list(ListingKey::board(1)).await.unwrap();
        let submissions = client
            .list(ListingKey::portfolio_submissions(1, "essay"))
            .await
            .unwrap();

        assert_eq!(board.policy(), FreshnessPolicy::BOARD);
        assert_eq!(submissions.policy(), FreshnessPolicy::PORTFOLIO_LIST);
    }

    #[tokio::test]
    async fn test_policy_override_applies_on_creation_only() {
        let client = ListingClient::new(RecordingSource::new());
        let key = ListingKey::board_msg(5);

        let cache = client
            .list_with_policy(key.clone(), FreshnessPolicy::NONE)
            .await
            .unwrap();
        assert!(cache.policy().is_uncached());

        let again = client.list(key).await.unwrap();
        assert!(again.policy().is_uncached());
    }

    #[tokio::test]
    async fn test_custom_policies() {
        let mut policies = ListingPolicies::default();
        policies.set(ListingKind::Board, FreshnessPolicy::NO_REVALIDATION);
        let client =
            ListingClient::with_policies(Arc::new(RecordingSource::new()), policies);

        let cache = client.list(ListingKey::board(1)).await.unwrap();
        assert_eq!(cache.policy(), FreshnessPolicy::NO_REVALIDATION);
        assert_eq!(
            ListingPolicies::uniform(FreshnessPolicy::NONE).policy_for(ListingKind::Portfolio),
            FreshnessPolicy::NONE
        );
    }

    #[tokio::test]
    async fn test_missing_first_page_is_empty_listing() {
        let client = ListingClient::new(source_with(&[]));

        let cache = client.list(ListingKey::board(404)).await.unwrap();
        assert_eq!(cache.total_count(), 0);
        assert_eq!(cache.get(0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_page_error_is_not_cached() {
        let client = ListingClient::new(RecordingSource::new());

        let err = client.list(ListingKey::board(99)).await.unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(client.cached_listings(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_rebuilds() {
        let key = ListingKey::board(1);
        let client = ListingClient::new(source_with(&[(key.clone(), 5)]));

        let old = client.list(key.clone()).await.unwrap();
        assert!(client.invalidate(&key));
        let new = client.list(key.clone()).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &new));

        client.invalidate_all();
        assert_eq!(client.cached_listings(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_list_fetches_first_page_once() {
        let key = ListingKey::board_msg(3);
        let source = InMemorySource::new();
        let upstream = Arc::new(
            InMemoryListing::new(vec!["a".to_string(), "b".to_string()], 10)
                .with_latency(Duration::from_millis(30)),
        );
        source.insert(key.clone(), upstream.clone());
        let client = ListingClient::new(source);

        let caches =
            futures::future::join_all((0..50).map(|_| client.list(key.clone()))).await;

        let first = caches[0].as_ref().unwrap();
        for cache in &caches {
            assert!(Arc::ptr_eq(cache.as_ref().unwrap(), first));
        }
        assert_eq!(upstream.fetch_count(), 1);
    }
}
