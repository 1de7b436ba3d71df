//! Error types for the market data cache
//!
//! Provides unified error handling using thiserror. `CacheError` covers the
//! cache's own machinery (storage, serialization, configuration) and never
//! reaches consumers as a fetch failure. `FetchError` is the per-symbol
//! taxonomy handed back inside a `FetchResult`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// == Cache Error Enum ==
/// Internal error type for the cache tiers and their configuration.
#[derive(Error, Debug)]
pub enum CacheError {
    /// SQLite reported an error
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while preparing the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer actor has stopped and no longer accepts jobs
    #[error("Store writer is closed")]
    WriterClosed,

    /// Persistence is disabled for this session
    #[error("Persistent store is disabled")]
    Disabled,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache internals.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Fetch Error Enum ==
/// Per-symbol failure reported in a `FetchResult`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchError {
    /// The remote source rejected the identifier
    #[error("invalid symbol")]
    InvalidSymbol,

    /// The transport failed before a response arrived
    #[error("network failure")]
    NetworkFailure,

    /// The symbol is valid but has no data for the requested range
    #[error("no data")]
    NoData,

    /// The remote call exceeded its deadline
    #[error("timeout")]
    Timeout,
}

impl FetchError {
    /// Returns true for transient failures a caller may retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::NetworkFailure | FetchError::Timeout)
    }

    /// Returns true when a previously cached value may stand in for a fresh one.
    ///
    /// Only transient failures qualify. `InvalidSymbol` and `NoData` are
    /// answers from the remote source, not an absence of one.
    pub fn allows_stale_fallback(&self) -> bool {
        self.is_retryable()
    }
}
