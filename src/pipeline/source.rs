//! Remote market data boundary
//!
//! The pipeline treats the remote API as a black box that answers a batch of
//! symbols with a success or an error per symbol, or fails as a whole.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::cache::{Category, Granularity};
use crate::error::FetchError;

/// Per-symbol answers from one batch call, keyed by symbol.
///
/// Symbols absent from the map are treated as `FetchError::NoData`.
pub type BatchResponse = HashMap<String, Result<serde_json::Value, FetchError>>;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetches one category for a batch of normalised symbols.
    ///
    /// `granularity` is only set for history. An `Err` means the whole call
    /// failed and applies to every symbol in the batch. Timeouts are the
    /// implementation's business; report them as `FetchError::Timeout`.
    async fn fetch_batch(
        &self,
        category: Category,
        symbols: &[String],
        granularity: Option<&Granularity>,
    ) -> Result<BatchResponse, FetchError>;
}
