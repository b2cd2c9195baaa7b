//! Pagewise - Revalidating Cache for Paginated Listings
//!
//! Presents a paginated upstream listing (boards, message lists, portfolio
//! submissions) as one random-access, streamable sequence. Pages are fetched
//! on demand with at most one in-flight fetch per page, and kept fresh with
//! a soft/hard time-based revalidation policy.
//!
//! # Architecture
//!
//! ```text
//! ListingClient ──▶ KeyedRegistry ──▶ PageCache ──▶ PageFetcher (upstream)
//! ```
//!
//! # Modules
//!
//! - [`paged`] - Page cache engine, freshness policies, streaming, registry
//! - [`listing`] - Listing keys, upstream source trait and cached client
//! - [`config`] - Duration parsing and YAML cache settings
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod listing;
pub mod paged;

// Re-export commonly used types
pub use config::{parse_duration, CacheSettings, PolicySpec};
pub use error::{Error, Result};
pub use listing::{ListingClient, ListingKey, ListingKind, ListingPolicies, ListingSource};
pub use paged::{
    FetchedPage, FreshnessPolicy, InMemoryListing, KeyedRegistry, PageCache, PageFetcher,
    PageStream,
};
