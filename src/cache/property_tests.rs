//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the ordering and freshness rules against random
//! inputs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

use crate::cache::{
    normalize_symbols, CacheEntry, CacheKey, Category, Decision, MemoryTier, TtlPolicy,
};
use crate::market::{MarketPhase, MarketStatus};

// == Strategies ==
fn symbol_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z]{1,5}(\\.[A-Z]{1,2})?"
}

fn status_strategy() -> impl Strategy<Value = MarketStatus> {
    prop_oneof![
        Just(MarketStatus::Open),
        Just(MarketStatus::Closed),
        Just(MarketStatus::Pre),
        Just(MarketStatus::Post),
    ]
}

fn category_strategy() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::Price),
        Just(Category::History),
        Just(Category::News),
    ]
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap()
}

fn entry_at(key: CacheKey, offset_secs: i64) -> CacheEntry {
    CacheEntry::new(
        key,
        serde_json::json!({ "offset": offset_secs }),
        base_time() + Duration::seconds(offset_secs),
        MarketStatus::Open,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Whatever order writes land in, the stored entry is the newest one.
    #[test]
    fn prop_memory_tier_keeps_newest_write(offsets in prop::collection::vec(0i64..100_000, 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let newest = *offsets.iter().max().unwrap();

        let stored = rt.block_on(async {
            let tier = MemoryTier::new();
            for offset in &offsets {
                tier.put(entry_at(CacheKey::price("AAPL"), *offset)).await;
            }
            tier.get(&CacheKey::price("AAPL")).await
        });

        let stored = stored.unwrap();
        prop_assert_eq!(stored.fetched_at, base_time() + Duration::seconds(newest));
        prop_assert_eq!(&stored.payload["offset"], &serde_json::json!(newest));
    }

    // A forced request never treats a non-metadata entry as fresh.
    #[test]
    fn prop_force_never_hits(
        category in category_strategy(),
        status in status_strategy(),
        age_secs in 0i64..200_000,
    ) {
        let policy = TtlPolicy::default();
        let now = base_time();
        let key = CacheKey::new(category, "AAPL", None);
        let entry = entry_at(key, -age_secs);
        let phase = MarketPhase { status, since: None, next_boundary: None };

        prop_assert_eq!(policy.decide(Some(&entry), &phase, true, now), Decision::Miss);
    }

    // Anything fresh while the market is open is still fresh once it closes.
    #[test]
    fn prop_closed_market_is_at_least_as_lenient(
        category in category_strategy(),
        age_secs in 0i64..200_000,
    ) {
        let policy = TtlPolicy::default();
        let now = base_time();
        let entry = entry_at(CacheKey::new(category, "AAPL", None), -age_secs);
        let open = MarketPhase { status: MarketStatus::Open, since: None, next_boundary: None };
        let closed = MarketPhase { status: MarketStatus::Closed, since: None, next_boundary: None };

        prop_assert!(policy.ttl(category, MarketStatus::Closed) > policy.ttl(category, MarketStatus::Open));
        if policy.decide(Some(&entry), &open, false, now) == Decision::Hit {
            prop_assert_eq!(policy.decide(Some(&entry), &closed, false, now), Decision::Hit);
        }
    }

    // Every requested symbol survives normalization exactly once.
    #[test]
    fn prop_normalize_symbols_is_complete(symbols in prop::collection::vec(symbol_strategy(), 0..30)) {
        let normalized = normalize_symbols(&symbols);

        let expected: HashSet<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
        let actual: HashSet<String> = normalized.iter().cloned().collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(normalized.len(), normalized.iter().collect::<HashSet<_>>().len());
    }
}
