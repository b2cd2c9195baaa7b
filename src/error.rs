//! Error types for the paged listing cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or reading a paged listing
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Construction Errors
    // =========================================================================
    /// Freshness policy with a hard limit shorter than its soft limit
    #[error("Invalid freshness policy: hard limit {hard:?} is shorter than soft limit {soft:?}")]
    InvalidPolicy { soft: Duration, hard: Duration },

    /// Initial page size hint cannot describe the initial total
    #[error("Invalid page size {page_size} for a listing of {total} items")]
    InvalidPageSize { page_size: usize, total: usize },

    // =========================================================================
    // Upstream Errors
    // =========================================================================
    /// The page fetch capability failed; surfaced unchanged
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML configuration could not be decoded
    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an arbitrary upstream failure.
    pub fn upstream(err: impl Into<anyhow::Error>) -> Self {
        Self::Upstream(err.into())
    }

    /// True when the error came from the fetch capability.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}
