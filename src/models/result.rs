//! Consumer-facing fetch results
//!
//! A `FetchResult` accounts for every requested symbol exactly once, either
//! with a served entry or with the error that prevented one.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheEntry, Category, Granularity};
use crate::error::{FetchError, Result};

/// Whether a served entry is within its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    /// Expired entry served because a refresh failed
    Stale,
}

/// Which layer answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Memory,
    Persistent,
    Remote,
}

// == Served ==
/// An entry handed back to a consumer, annotated with how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct Served {
    pub entry: CacheEntry,
    pub freshness: Freshness,
    pub tier: Tier,
}

impl Served {
    pub fn fresh(entry: CacheEntry, tier: Tier) -> Self {
        Self {
            entry,
            freshness: Freshness::Fresh,
            tier,
        }
    }

    /// Wraps an expired entry substituted for a failed refresh.
    pub fn stale(entry: CacheEntry, tier: Tier) -> Self {
        Self {
            entry: entry.into_fallback(),
            freshness: Freshness::Stale,
            tier,
        }
    }

    /// True when this is the last known value rather than a fresh one.
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.entry.decode()
    }
}

// == Fetch Result ==
/// Outcome of a fetch, one slot per requested symbol.
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub category: Category,
    pub granularity: Option<Granularity>,
    outcomes: BTreeMap<String, std::result::Result<Served, FetchError>>,
}

impl FetchResult {
    // == Constructor ==
    pub fn new(category: Category, granularity: Option<Granularity>) -> Self {
        Self {
            category,
            granularity,
            outcomes: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, symbol: String, outcome: std::result::Result<Served, FetchError>) {
        self.outcomes.insert(symbol, outcome);
    }

    // == Accessors ==
    /// Number of symbols accounted for.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcome for one symbol (normalised form).
    pub fn get(&self, symbol: &str) -> Option<&std::result::Result<Served, FetchError>> {
        self.outcomes.get(&symbol.trim().to_uppercase())
    }

    /// Served entry for one symbol, if it has one.
    pub fn served(&self, symbol: &str) -> Option<&Served> {
        self.get(symbol).and_then(|outcome| outcome.as_ref().ok())
    }

    /// Error for one symbol, if it failed.
    pub fn error(&self, symbol: &str) -> Option<FetchError> {
        self.get(symbol).and_then(|outcome| outcome.as_ref().err().copied())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.outcomes.keys().map(String::as_str)
    }

    /// All served entries, fresh and stale.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Served)> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, outcome)| outcome.as_ref().ok().map(|s| (symbol.as_str(), s)))
    }

    /// Per-symbol error list.
    pub fn errors(&self) -> impl Iterator<Item = (&str, FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|(symbol, outcome)| outcome.as_ref().err().map(|e| (symbol.as_str(), *e)))
    }

    /// Symbols served from an expired entry after a failed refresh.
    pub fn stale_symbols(&self) -> Vec<&str> {
        self.entries()
            .filter(|(_, served)| served.is_stale())
            .map(|(symbol, _)| symbol)
            .collect()
    }

    /// Decodes every served payload, skipping failures.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Vec<(String, T)> {
        self.entries()
            .filter_map(|(symbol, served)| served.decode().ok().map(|v| (symbol.to_string(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, EntrySource};
    use crate::market::MarketStatus;
    use chrono::Utc;

    fn entry(symbol: &str) -> CacheEntry {
        CacheEntry::new(
            CacheKey::price(symbol),
            serde_json::json!({"symbol": symbol}),
            Utc::now(),
            MarketStatus::Open,
        )
    }

    #[test]
    fn test_result_partitions_outcomes() {
        let mut result = FetchResult::new(Category::Price, None);
        result.insert("AAPL".to_string(), Ok(Served::fresh(entry("AAPL"), Tier::Remote)));
        result.insert("MSFT".to_string(), Ok(Served::stale(entry("MSFT"), Tier::Memory)));
        result.insert("BOGUS".to_string(), Err(FetchError::InvalidSymbol));

        assert_eq!(result.len(), 3);
        assert_eq!(result.entries().count(), 2);
        assert_eq!(result.errors().collect::<Vec<_>>(), vec![("BOGUS", FetchError::InvalidSymbol)]);
        assert_eq!(result.stale_symbols(), vec!["MSFT"]);
        assert_eq!(result.error("bogus"), Some(FetchError::InvalidSymbol));
    }

    #[test]
    fn test_stale_served_is_marked_fallback() {
        let served = Served::stale(entry("AAPL"), Tier::Persistent);
        assert!(served.is_stale());
        assert_eq!(served.entry.source, EntrySource::Fallback);
    }
}
