//! Market Cache - market-aware caching between a market data UI and its remote source
//!
//! Answers price, history, news and metadata requests from memory, from a
//! SQLite store, or with one batched remote call, choosing TTLs by whether the
//! symbol's exchange is trading.

pub mod cache;
pub mod config;
pub mod error;
pub mod market;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod storage;
pub mod tasks;
pub mod telemetry;

pub use cache::{CacheEntry, CacheKey, CacheStats, Category, Granularity, TtlPolicy};
pub use config::{Config, MetadataRefresh};
pub use error::{CacheError, FetchError, Result};
pub use market::{MarketOracle, MarketPhase, MarketStatus};
pub use models::{FetchResult, Freshness, Served, Tier};
pub use pipeline::{FetchCompleted, FetchPipeline, FetchRequest, MarketDataSource, Submission};
pub use service::MarketCache;
pub use storage::{PersistentOptions, PersistentTier};
pub use tasks::spawn_prune_task;
