//! Cache Entry Module
//!
//! Defines committed cache entries and ticker metadata records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, Category};
use crate::error::Result;
use crate::market::MarketStatus;
use crate::models::TickerMetadata;

// == Entry Source ==
/// Where a served entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Produced by a successful remote call
    Remote,
    /// An older entry substituted after a failed refresh
    Fallback,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::Remote => "remote",
            EntrySource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntrySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "remote" => Ok(EntrySource::Remote),
            "fallback" => Ok(EntrySource::Fallback),
            other => Err(format!("unknown entry source '{}'", other)),
        }
    }
}

// == Put Outcome ==
/// Result of writing an entry into a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The entry replaced (or created) the stored one
    Applied,
    /// The stored entry is newer; nothing changed
    Rejected,
}

// == Cache Entry ==
/// A committed cache entry. Updates replace entries wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Serialized payload, opaque to the cache
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    pub market_status_at_fetch: MarketStatus,
    pub source: EntrySource,
}

impl CacheEntry {
    // == Constructors ==
    /// Creates an entry for a payload fetched from the remote source.
    pub fn new(
        key: CacheKey,
        payload: serde_json::Value,
        fetched_at: DateTime<Utc>,
        market_status_at_fetch: MarketStatus,
    ) -> Self {
        Self {
            key,
            payload,
            fetched_at,
            market_status_at_fetch,
            source: EntrySource::Remote,
        }
    }

    /// Creates an entry by serializing a typed record.
    pub fn from_record<T: Serialize>(
        key: CacheKey,
        record: &T,
        fetched_at: DateTime<Utc>,
        market_status_at_fetch: MarketStatus,
    ) -> Result<Self> {
        let payload = serde_json::to_value(record)?;
        Ok(Self::new(key, payload, fetched_at, market_status_at_fetch))
    }

    // == Age ==
    /// Time elapsed since the fetch, never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).max(Duration::zero())
    }

    // == Decode ==
    /// Deserializes the payload into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Marks the entry as substituted for a failed refresh.
    pub fn into_fallback(mut self) -> Self {
        self.source = EntrySource::Fallback;
        self
    }

    /// True if writing `self` over `existing` respects timestamp ordering.
    pub fn may_replace(&self, existing: &CacheEntry) -> bool {
        self.fetched_at >= existing.fetched_at
    }
}

// == Metadata Entry ==
/// Long-lived ticker metadata, kept in its own table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub symbol: String,
    pub exchange: Option<String>,
    pub display_name: Option<String>,
    pub last_verified_at: DateTime<Utc>,
}

impl MetadataEntry {
    pub fn new(
        symbol: &str,
        exchange: Option<String>,
        display_name: Option<String>,
        last_verified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            exchange,
            display_name,
            last_verified_at,
        }
    }

    /// Rebuilds metadata from a metadata-category cache entry.
    pub fn from_cache_entry(entry: &CacheEntry) -> Result<Self> {
        let record: TickerMetadata = entry.decode()?;
        Ok(Self {
            symbol: entry.key.symbol.clone(),
            exchange: record.exchange,
            display_name: record.display_name,
            last_verified_at: entry.fetched_at,
        })
    }

    /// Converts to a metadata-category cache entry.
    pub fn to_cache_entry(&self) -> Result<CacheEntry> {
        let record = TickerMetadata {
            exchange: self.exchange.clone(),
            display_name: self.display_name.clone(),
        };
        // Metadata freshness does not depend on the session.
        CacheEntry::from_record(
            CacheKey::metadata(&self.symbol),
            &record,
            self.last_verified_at,
            MarketStatus::Closed,
        )
    }
}

/// Current time at the millisecond precision the persistent tier keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Returns true if the entry belongs to the metadata table.
pub fn is_metadata(entry: &CacheEntry) -> bool {
    entry.key.category == Category::Metadata
}
