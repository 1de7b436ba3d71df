//! Payload records and consumer-facing results
//!
//! This module defines the record shapes the remote source returns for each
//! category and the `FetchResult` handed back to data consumers.

pub mod records;
pub mod result;

// Re-export commonly used types
pub use records::{HistoryBar, NewsItem, PriceQuote, TickerMetadata};
pub use result::{FetchResult, Freshness, Served, Tier};
