//! Listings
//!
//! The site's paginated listings (boards, letters home, portfolios and
//! their submissions) behind one cached client.
//!
//! # Usage
//!
//! ```ignore
//! use pagewise::listing::{ListingClient, ListingKey};
//!
//! let client = ListingClient::new(site_source);
//! let board = client.list(ListingKey::board(12)).await?;
//! let newest = board.get(0).await?;
//! ```

pub mod client;
pub mod key;
pub mod source;

pub use client::{ListingClient, ListingPolicies};
pub use key::{Category, DbId, ListingKey, ListingKind};
pub use source::{InMemorySource, ListingSource};
