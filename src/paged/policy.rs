//! Freshness Policies
//!
//! Time-based revalidation rules for paged listings. A policy is a pair of
//! limits measured from the last successful validation:
//!
//! - **soft**: once elapsed, the first page is probed and the cache is cleared
//!   only if the probe shows a change.
//! - **hard**: once elapsed, the cache is cleared unconditionally.
//!
//! A zero limit fires on every access; [`Duration::MAX`] never fires.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Unbounded limit
pub const NEVER: Duration = Duration::MAX;

/// Freshness policy for a paged listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreshnessPolicy {
    soft: Duration,
    hard: Duration,
}

impl FreshnessPolicy {
    /// No caching: every read goes upstream.
    pub const NONE: Self = Self {
        soft: Duration::ZERO,
        hard: Duration::ZERO,
    };

    /// Cache forever, never revalidate.
    pub const NO_REVALIDATION: Self = Self {
        soft: NEVER,
        hard: NEVER,
    };

    /// Board (notices) default: probe hourly, expire daily.
    pub const BOARD: Self = Self {
        soft: Duration::from_secs(60 * 60),
        hard: Duration::from_secs(24 * 60 * 60),
    };

    /// Board message (letters home) default.
    pub const BOARD_MSG: Self = Self {
        soft: Duration::from_secs(60 * 60),
        hard: Duration::from_secs(24 * 60 * 60),
    };

    /// Portfolio category default.
    pub const PORTFOLIO: Self = Self {
        soft: Duration::from_secs(60 * 60),
        hard: Duration::from_secs(24 * 60 * 60),
    };

    /// Portfolio submission list default: these move faster.
    pub const PORTFOLIO_LIST: Self = Self {
        soft: Duration::from_secs(30 * 60),
        hard: Duration::from_secs(12 * 60 * 60),
    };

    /// Create a policy, rejecting `hard < soft`.
    pub fn new(soft: Duration, hard: Duration) -> Result<Self> {
        if hard < soft {
            return Err(Error::InvalidPolicy { soft, hard });
        }
        Ok(Self { soft, hard })
    }

    /// Probe-only policy that never hard-expires.
    pub fn soft_only(soft: Duration) -> Self {
        Self { soft, hard: NEVER }
    }

    pub fn soft(&self) -> Duration {
        self.soft
    }

    pub fn hard(&self) -> Duration {
        self.hard
    }

    /// True when nothing may be cached at all.
    pub fn is_uncached(&self) -> bool {
        self.soft.is_zero() && self.hard.is_zero()
    }

    /// True when the hard limit can never fire.
    pub fn never_expires(&self) -> bool {
        self.hard == NEVER
    }

    /// Check whether the whole cache must be dropped
    pub fn hard_expired(&self, elapsed: Duration) -> bool {
        self.hard.is_zero() || (self.hard != NEVER && elapsed >= self.hard)
    }

    /// Check whether the first page should be probed for changes
    pub fn soft_expired(&self, elapsed: Duration) -> bool {
        self.soft.is_zero() || (self.soft != NEVER && elapsed >= self.soft)
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::BOARD
    }
}

impl fmt::Display for FreshnessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn limit(d: Duration) -> String {
            if d == NEVER {
                "never".to_string()
            } else {
                format!("{:?}", d)
            }
        }

        if self.is_uncached() {
            return write!(f, "uncached");
        }
        write!(f, "soft={} hard={}", limit(self.soft), limit(self.hard))
    }
}

// =============================================================================
// Tests
// =============================================================================
