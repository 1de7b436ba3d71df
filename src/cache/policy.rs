//! Cache Policy Module
//!
//! Pure freshness decisions: given an entry, the market phase and the force
//! flag, decide whether the entry is served, kept as a fallback, or ignored.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{CacheEntry, Category};
use crate::error::{CacheError, Result};
use crate::market::{MarketPhase, MarketStatus};

/// Decimal places used when comparing prices for change highlighting.
pub const PRICE_PRECISION: u32 = 2;

// == Decision ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Entry is fresh; serve it without a remote call
    Hit,
    /// Entry is expired; refresh it, but serve it flagged if the refresh fails
    StaleOk,
    /// No usable entry; a remote call is required
    Miss,
}

// == TTL Table ==
/// TTLs of one category for each session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlTable {
    pub open: Duration,
    /// Pre-market and post-market
    pub extended: Duration,
    pub closed: Duration,
}

impl TtlTable {
    pub fn new(open: Duration, extended: Duration, closed: Duration) -> Self {
        Self {
            open,
            extended,
            closed,
        }
    }

    pub fn ttl(&self, status: MarketStatus) -> Duration {
        match status {
            MarketStatus::Open => self.open,
            MarketStatus::Pre | MarketStatus::Post => self.extended,
            MarketStatus::Closed => self.closed,
        }
    }

    /// Requires `open < extended < closed`.
    fn validate(&self, category: Category) -> Result<()> {
        if self.open < self.extended && self.extended < self.closed {
            Ok(())
        } else {
            Err(CacheError::Config(format!(
                "{} TTLs must increase from open ({:?}) to extended ({:?}) to closed ({:?})",
                category, self.open, self.extended, self.closed
            )))
        }
    }
}

// == TTL Policy ==
/// Freshness rules for every category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub price: TtlTable,
    pub history: TtlTable,
    pub news: TtlTable,
    /// Metadata freshness is independent of the session
    pub metadata: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            price: TtlTable::new(
                Duration::from_secs(300),
                Duration::from_secs(900),
                Duration::from_secs(86_400),
            ),
            history: TtlTable::new(
                Duration::from_secs(900),
                Duration::from_secs(1_800),
                Duration::from_secs(86_400),
            ),
            news: TtlTable::new(
                Duration::from_secs(3_600),
                Duration::from_secs(7_200),
                Duration::from_secs(86_400),
            ),
            metadata: Duration::from_secs(30 * 86_400),
        }
    }
}

impl TtlPolicy {
    // == Constructor ==
    /// Builds a policy, rejecting tables whose closed TTL is not the longest.
    pub fn new(price: TtlTable, history: TtlTable, news: TtlTable, metadata: Duration) -> Result<Self> {
        price.validate(Category::Price)?;
        history.validate(Category::History)?;
        news.validate(Category::News)?;
        Ok(Self {
            price,
            history,
            news,
            metadata,
        })
    }

    // == TTL ==
    /// Maximum fresh age for a category under a session status.
    pub fn ttl(&self, category: Category, status: MarketStatus) -> Duration {
        match category {
            Category::Price => self.price.ttl(status),
            Category::History => self.history.ttl(status),
            Category::News => self.news.ttl(status),
            Category::Metadata => self.metadata,
        }
    }

    // == Decide ==
    /// Classifies an entry for serving.
    ///
    /// Besides the TTL, an entry fetched before the current phase began is
    /// expired: a price taken a minute before the close is not the closing
    /// price, however young it is. Metadata ignores both the force flag and
    /// the session.
    pub fn decide(
        &self,
        entry: Option<&CacheEntry>,
        phase: &MarketPhase,
        force: bool,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(entry) = entry else {
            return Decision::Miss;
        };

        let category = entry.key.category;
        if category == Category::Metadata {
            return if within(entry, self.metadata, now) {
                Decision::Hit
            } else {
                Decision::StaleOk
            };
        }

        if force {
            return Decision::Miss;
        }

        let predates_phase = phase.since.is_some_and(|since| entry.fetched_at < since);
        if !predates_phase && within(entry, self.ttl(category, phase.status), now) {
            Decision::Hit
        } else {
            Decision::StaleOk
        }
    }
}

fn within(entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> bool {
    match entry.age(now).to_std() {
        Ok(age) => age <= ttl,
        Err(_) => true,
    }
}

// == Rounding ==
/// Rounds to a fixed number of decimal places.
pub fn round_to_precision(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Compares two prices at `PRICE_PRECISION`, ignoring floating-point noise.
pub fn compare_rounded(old: f64, new: f64) -> Ordering {
    let old = round_to_precision(old, PRICE_PRECISION);
    let new = round_to_precision(new, PRICE_PRECISION);
    old.partial_cmp(&new).unwrap_or(Ordering::Equal)
}

/// True if `new` differs from `old` once both are rounded.
pub fn is_meaningful_change(old: f64, new: f64) -> bool {
    compare_rounded(old, new) != Ordering::Equal
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use chrono::Duration as ChronoDuration;

    fn entry_aged(key: CacheKey, now: DateTime<Utc>, age_secs: i64) -> CacheEntry {
        CacheEntry::new(
            key,
            serde_json::json!({}),
            now - ChronoDuration::seconds(age_secs),
            MarketStatus::Open,
        )
    }

    fn phase(status: MarketStatus) -> MarketPhase {
        MarketPhase {
            status,
            since: None,
            next_boundary: None,
        }
    }

    #[test]
    fn test_closed_ttl_exceeds_open_for_every_category() {
        let policy = TtlPolicy::default();
        for category in [Category::Price, Category::History, Category::News] {
            assert!(policy.ttl(category, MarketStatus::Closed) > policy.ttl(category, MarketStatus::Open));
            assert!(policy.ttl(category, MarketStatus::Pre) > policy.ttl(category, MarketStatus::Open));
            assert!(policy.ttl(category, MarketStatus::Post) < policy.ttl(category, MarketStatus::Closed));
        }
    }

    #[test]
    fn test_missing_entry_is_miss() {
        let policy = TtlPolicy::default();
        assert_eq!(
            policy.decide(None, &phase(MarketStatus::Open), false, Utc::now()),
            Decision::Miss
        );
    }

    #[test]
    fn test_open_market_short_ttl() {
        let policy = TtlPolicy::default();
        let now = Utc::now();
        let young = entry_aged(CacheKey::price("AAPL"), now, 60);
        let old = entry_aged(CacheKey::price("AAPL"), now, 600);

        assert_eq!(policy.decide(Some(&young), &phase(MarketStatus::Open), false, now), Decision::Hit);
        assert_eq!(policy.decide(Some(&old), &phase(MarketStatus::Open), false, now), Decision::StaleOk);
        assert_eq!(policy.decide(Some(&old), &phase(MarketStatus::Closed), false, now), Decision::Hit);
    }

    #[test]
    fn test_ttl_boundary_is_inclusive() {
        let policy = TtlPolicy::default();
        let now = Utc::now();
        let at_limit = entry_aged(CacheKey::price("AAPL"), now, 300);
        assert_eq!(policy.decide(Some(&at_limit), &phase(MarketStatus::Open), false, now), Decision::Hit);
    }

    #[test]
    fn test_force_bypasses_cache_except_metadata() {
        let policy = TtlPolicy::default();
        let now = Utc::now();
        let price = entry_aged(CacheKey::price("AAPL"), now, 1);
        let meta = entry_aged(CacheKey::metadata("AAPL"), now, 1);

        assert_eq!(policy.decide(Some(&price), &phase(MarketStatus::Open), true, now), Decision::Miss);
        assert_eq!(policy.decide(Some(&meta), &phase(MarketStatus::Open), true, now), Decision::Hit);
    }

    #[test]
    fn test_entry_from_previous_phase_is_expired() {
        let policy = TtlPolicy::default();
        let now = Utc::now();
        let entry = entry_aged(CacheKey::price("AAPL"), now, 120);
        let just_closed = MarketPhase {
            status: MarketStatus::Post,
            since: Some(now - ChronoDuration::seconds(60)),
            next_boundary: None,
        };
        assert_eq!(policy.decide(Some(&entry), &just_closed, false, now), Decision::StaleOk);
    }

    #[test]
    fn test_metadata_long_ttl() {
        let policy = TtlPolicy::default();
        let now = Utc::now();
        let week_old = entry_aged(CacheKey::metadata("AAPL"), now, 7 * 86_400);
        let ancient = entry_aged(CacheKey::metadata("AAPL"), now, 60 * 86_400);

        assert_eq!(policy.decide(Some(&week_old), &phase(MarketStatus::Open), false, now), Decision::Hit);
        assert_eq!(policy.decide(Some(&ancient), &phase(MarketStatus::Open), false, now), Decision::StaleOk);
    }

    #[test]
    fn test_policy_rejects_inverted_ttls() {
        let inverted = TtlTable::new(
            Duration::from_secs(3_600),
            Duration::from_secs(600),
            Duration::from_secs(60),
        );
        let defaults = TtlPolicy::default();
        let result = TtlPolicy::new(inverted, defaults.history, defaults.news, defaults.metadata);
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_rounding_ignores_float_noise() {
        assert_eq!(round_to_precision(1.23456, 2), 1.23);
        assert!(!is_meaningful_change(0.1 + 0.2, 0.3));
        assert!(is_meaningful_change(100.004, 100.016));
        assert_eq!(compare_rounded(10.001, 10.004), Ordering::Equal);
        assert_eq!(compare_rounded(10.01, 10.02), Ordering::Less);
    }
}
