//! Listing keys
//!
//! Every paged listing the client can cache, as a closed set of variants.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::source::ListingSource;
use crate::error::Result;
use crate::paged::FetchedPage;

/// Board database identifier (value object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbId(pub u32);

impl fmt::Display for DbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DbId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Portfolio category identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(pub String);

impl Category {
    pub fn new(category: impl Into<String>) -> Self {
        Self(category.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of listing, used to pick a default freshness policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Board,
    BoardMsg,
    Portfolio,
    PortfolioSubmissions,
}

impl ListingKind {
    pub const ALL: [ListingKind; 4] = [
        ListingKind::Board,
        ListingKind::BoardMsg,
        ListingKind::Portfolio,
        ListingKind::PortfolioSubmissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Board => "board",
            ListingKind::BoardMsg => "board_msg",
            ListingKind::Portfolio => "portfolio",
            ListingKind::PortfolioSubmissions => "portfolio_submissions",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one cached listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingKey {
    /// Notice board posts
    Board { db: DbId },
    /// Letters sent home
    BoardMsg { db: DbId },
    /// Portfolio categories of a board
    Portfolio { db: DbId },
    /// Submissions within one portfolio category
    PortfolioSubmissions { db: DbId, category: Category },
}

impl ListingKey {
    pub fn board(db: impl Into<DbId>) -> Self {
        Self::Board { db: db.into() }
    }

    pub fn board_msg(db: impl Into<DbId>) -> Self {
        Self::BoardMsg { db: db.into() }
    }

    pub fn portfolio(db: impl Into<DbId>) -> Self {
        Self::Portfolio { db: db.into() }
    }

    pub fn portfolio_submissions(db: impl Into<DbId>, category: impl Into<Category>) -> Self {
        Self::PortfolioSubmissions {
            db: db.into(),
            category: category.into(),
        }
    }

    pub fn kind(&self) -> ListingKind {
        match self {
            Self::Board { .. } => ListingKind::Board,
            Self::BoardMsg { .. } => ListingKind::BoardMsg,
            Self::Portfolio { .. } => ListingKind::Portfolio,
            Self::PortfolioSubmissions { .. } => ListingKind::PortfolioSubmissions,
        }
    }

    pub fn db(&self) -> DbId {
        match self {
            Self::Board { db }
            | Self::BoardMsg { db }
            | Self::Portfolio { db }
            | Self::PortfolioSubmissions { db, .. } => *db,
        }
    }

    /// Fetch a zero-based page of this listing from `source`.
    ///
    /// Upstream pages are numbered from 1.
    pub async fn fetch<S>(&self, source: &S, page: usize) -> Result<Option<FetchedPage<S::Item>>>
    where
        S: ListingSource + ?Sized,
    {
        let upstream_page = page + 1;
        match self {
            Self::Board { db } => source.board(*db, upstream_page).await,
            Self::BoardMsg { db } => source.board_msg(*db, upstream_page).await,
            Self::Portfolio { db } => source.portfolio(*db, upstream_page).await,
            Self::PortfolioSubmissions { db, category } => {
                source
                    .portfolio_submissions(*db, category, upstream_page)
                    .await
            }
        }
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortfolioSubmissions { db, category } => {
                write!(f, "{}/{}/{}", self.kind(), db, category)
            }
            _ => write!(f, "{}/{}", self.kind(), self.db()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_db() {
        let key = ListingKey::portfolio_submissions(7, "essay");
        assert_eq!(key.kind(), ListingKind::PortfolioSubmissions);
        assert_eq!(key.db(), DbId(7));
        assert_eq!(ListingKey::board_msg(3).kind(), ListingKind::BoardMsg);
    }

    #[test]
    fn test_display() {
        assert_eq!(ListingKey::board(12).to_string(), "board/12");
        assert_eq!(
            ListingKey::portfolio_submissions(3, "essay").to_string(),
            "portfolio_submissions/3/essay"
        );
    }

    #[test]
    fn test_key_identity() {
        assert_ne!(ListingKey::board(1), ListingKey::board_msg(1));
        assert_ne!(
            ListingKey::portfolio_submissions(1, "a"),
            ListingKey::portfolio_submissions(1, "b")
        );
    }

    #[test]
    fn test_key_serde() {
        let key = ListingKey::portfolio_submissions(4, "reading");
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["kind"], "portfolio_submissions");
        assert_eq!(json["db"], 4);
        assert_eq!(json["category"], "reading");

        let back: ListingKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);
    }
}
