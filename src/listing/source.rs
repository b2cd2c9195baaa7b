//! Upstream listing endpoints
//!
//! Implemented by the site client. Pages are numbered from 1, as the
//! upstream numbers them; `Ok(None)` means the page does not exist.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::key::{Category, DbId, ListingKey};
use crate::error::Result;
use crate::paged::{FetchedPage, InMemoryListing, PageFetcher};

/// One async method per listing kind
#[async_trait]
pub trait ListingSource: Send + Sync + 'static {
    /// Item type shared by every listing of this source
    type Item: Clone + PartialEq + Send + Sync + 'static;

    async fn board(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<Self::Item>>>;

    async fn board_msg(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<Self::Item>>>;

    async fn portfolio(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<Self::Item>>>;

    async fn portfolio_submissions(
        &self,
        db: DbId,
        category: &Category,
        page: usize,
    ) -> Result<Option<FetchedPage<Self::Item>>>;
}

/// In-memory source serving one [`InMemoryListing`] per key
pub struct InMemorySource<T> {
    listings: DashMap<ListingKey, Arc<InMemoryListing<T>>>,
}

impl<T> InMemorySource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            listings: DashMap::new(),
        }
    }

    /// Serve `listing` for `key`, replacing any previous one
    pub fn insert(&self, key: ListingKey, listing: Arc<InMemoryListing<T>>) {
        self.listings.insert(key, listing);
    }

    pub fn listing(&self, key: &ListingKey) -> Option<Arc<InMemoryListing<T>>> {
        self.listings.get(key).map(|entry| Arc::clone(entry.value()))
    }

    async fn serve(&self, key: ListingKey, page: usize) -> Result<Option<FetchedPage<T>>> {
        let Some(listing) = self.listing(&key) else {
            return Ok(None);
        };
        match page.checked_sub(1) {
            Some(page) => listing.fetch_page(page).await,
            None => Ok(None),
        }
    }
}

impl<T> Default for InMemorySource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> ListingSource for InMemorySource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Item = T;

    async fn board(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<T>>> {
        self.serve(ListingKey::Board { db }, page).await
    }

    async fn board_msg(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<T>>> {
        self.serve(ListingKey::BoardMsg { db }, page).await
    }

    async fn portfolio(&self, db: DbId, page: usize) -> Result<Option<FetchedPage<T>>> {
        self.serve(ListingKey::Portfolio { db }, page).await
    }

    async fn portfolio_submissions(
        &self,
        db: DbId,
        category: &Category,
        page: usize,
    ) -> Result<Option<FetchedPage<T>>> {
        let key = ListingKey::PortfolioSubmissions {
            db,
            category: category.clone(),
        };
        self.serve(key, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_source_is_one_based() {
        let source = InMemorySource::new();
        let key = ListingKey::board(1);
        source.insert(
            key.clone(),
            Arc::new(InMemoryListing::new((0..15).collect::<Vec<u32>>(), 10)),
        );

        let first = source.board(DbId(1), 1).await.unwrap().unwrap();
        assert_eq!(first.items, (0..10).collect::<Vec<u32>>());
        assert_eq!(first.total, 15);

        assert!(source.board(DbId(1), 0).await.unwrap().is_none());
        assert!(source.board(DbId(2), 1).await.unwrap().is_none());
        assert!(source.board_msg(DbId(1), 1).await.unwrap().is_none());

        // Engine pages are zero-based
        let second = key.fetch(&source, 1).await.unwrap().unwrap();
        assert_eq!(second.items, (10..15).collect::<Vec<u32>>());
    }
}
