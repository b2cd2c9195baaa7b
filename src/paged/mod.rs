//! Paged Listing Cache
//!
//! Turns a paginated upstream (`fetch page N -> items + total`) into a
//! random-access, streamable sequence with time-based revalidation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KeyedRegistry<K, T>                      │
//! │          key ──▶ Arc<PageCache<T>>  (built once per key)    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PageCache<T>                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ Freshness    │  │ Page map     │  │ Per-page locks   │   │
//! │  │ soft / hard  │  │ total, size  │  │ one fetch/page   │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                      PageFetcher<T> (upstream)
//! ```
//!
//! # Freshness
//!
//! - Soft limit: probe page 0; clear everything only if it changed
//! - Hard limit: clear everything
//! - Both zero: no caching, every read goes upstream

pub mod cache;
pub mod fetcher;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod stream;

mod proptest;

pub use cache::PageCache;
pub use fetcher::{fetcher_fn, FetchedPage, FnFetcher, InMemoryListing, PageFetcher};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use policy::{FreshnessPolicy, NEVER};
pub use registry::KeyedRegistry;
pub use stream::{PageStream, DEFAULT_READ_AHEAD};
