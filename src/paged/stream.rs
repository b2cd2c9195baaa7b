//! Ordered Traversal with Read-Ahead
//!
//! Walks a [`PageCache`] from index 0 in order. Entering page `p` spawns
//! preloads for the next pages so their fetches overlap with consumption of
//! `p`. Read-ahead tasks are owned by the stream and aborted when it drops.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::task::AbortOnDropHandle;
use tracing::{trace, warn};

use super::cache::PageCache;
use crate::error::Result;

/// Lazy, finite, ordered traversal of a listing
pub type PageStream<T> = BoxStream<'static, Result<T>>;

/// Read-ahead depth used by [`PageCache::stream`]
pub const DEFAULT_READ_AHEAD: usize = 1;

struct Traversal<T> {
    cache: Arc<PageCache<T>>,
    index: usize,
    /// Total snapshot taken when the traversal started
    end: usize,
    depth: usize,
    current_page: Option<usize>,
    scheduled_through: Option<usize>,
    read_ahead: VecDeque<(usize, AbortOnDropHandle<()>)>,
    done: bool,
}

impl<T> Traversal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn new(cache: Arc<PageCache<T>>, depth: usize) -> Self {
        let end = cache.total_count();
        let depth = if cache.policy().is_uncached() { 0 } else { depth };
        Self {
            cache,
            index: 0,
            end,
            depth,
            current_page: None,
            scheduled_through: None,
            read_ahead: VecDeque::new(),
            done: false,
        }
    }

    async fn next(mut self) -> Option<(Result<T>, Self)> {
        if self.done || self.index >= self.end {
            return None;
        }

        self.schedule_read_ahead();

        match self.cache.get(self.index).await {
            Ok(Some(item)) => {
                self.index += 1;
                Some((Ok(item), self))
            }
            Ok(None) => {
                trace!(index = self.index, end = self.end, "traversal reached absent index");
                None
            }
            Err(e) => {
                self.done = true;
                Some((Err(e), self))
            }
        }
    }

    fn schedule_read_ahead(&mut self) {
        if self.depth == 0 {
            return;
        }
        let page_size = self.cache.page_size();
        if page_size == 0 {
            return;
        }

        let page = self.index / page_size;
        if self.current_page == Some(page) {
            return;
        }
        self.current_page = Some(page);

        // Pages behind the cursor are of no further use
        while self
            .read_ahead
            .front()
            .is_some_and(|(scheduled, _)| *scheduled < page)
        {
            self.read_ahead.pop_front();
        }

        let last_page = (self.end - 1) / page_size;
        let first = match self.scheduled_through {
            Some(through) if through > page => through + 1,
            _ => page + 1,
        };
        let through = (page + self.depth).min(last_page);

        for ahead in first..=through {
            let cache = Arc::clone(&self.cache);
            let handle = tokio::spawn(async move {
                if let Err(e) = cache.preload(ahead * page_size).await {
                    warn!(page = ahead, error = %e, "read-ahead fetch failed");
                }
            });
            self.read_ahead
                .push_back((ahead, AbortOnDropHandle::new(handle)));
            self.scheduled_through = Some(ahead);
        }
    }
}

impl<T> PageCache<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Stream every item in order, reading one page ahead
    pub fn stream(self: &Arc<Self>) -> PageStream<T> {
        self.stream_with_read_ahead(DEFAULT_READ_AHEAD)
    }

    /// Stream every item in order, keeping up to `depth` pages in flight
    /// ahead of the consumer. A depth of 0 fetches strictly on demand.
    ///
    /// The traversal ends at the total count observed when it starts, at
    /// the first absent index, or after yielding an upstream error.
    pub fn stream_with_read_ahead(self: &Arc<Self>, depth: usize) -> PageStream<T> {
        let traversal = Traversal::new(Arc::clone(self), depth);
        stream::unfold(traversal, Traversal::next).boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================
