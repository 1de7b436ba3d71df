//! Cache Module
//!
//! Keys, entries, the memory tier and the freshness policy shared by the
//! fetch pipeline and the persistent store.

mod entry;
mod key;
mod memory;
mod policy;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{is_metadata, now_millis, CacheEntry, EntrySource, MetadataEntry, PutOutcome};
pub use key::{normalize_symbol, normalize_symbols, CacheKey, Category, Granularity};
pub use memory::MemoryTier;
pub use policy::{
    compare_rounded, is_meaningful_change, round_to_precision, Decision, TtlPolicy, TtlTable,
    PRICE_PRECISION,
};
pub use stats::CacheStats;
