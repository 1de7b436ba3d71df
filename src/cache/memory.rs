//! Memory Tier Module
//!
//! Process-lifetime map from cache key to entry. Shared between fetch workers
//! and consumers behind a `tokio::sync::RwLock`; entries are replaced whole,
//! so readers see either the previous or the new entry.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::cache::{CacheEntry, CacheKey, MetadataEntry, PutOutcome};

// == Memory Tier ==
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryTier {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Returns a copy of the entry stored under `key`.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    // == Put ==
    /// Stores an entry unless a newer one is already present.
    pub async fn put(&self, entry: CacheEntry) -> PutOutcome {
        let mut entries = self.entries.write().await;
        insert_if_newer(&mut entries, entry)
    }

    /// Stores several entries under one lock acquisition.
    ///
    /// Returns how many were rejected as out of order.
    pub async fn put_all<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = CacheEntry>,
    {
        let mut map = self.entries.write().await;
        entries
            .into_iter()
            .map(|entry| insert_if_newer(&mut map, entry))
            .filter(|outcome| *outcome == PutOutcome::Rejected)
            .count()
    }

    // == Metadata ==
    /// Exchange code recorded for `symbol`, if its metadata is cached.
    pub async fn exchange_of(&self, symbol: &str) -> Option<String> {
        let entry = self.get(&CacheKey::metadata(symbol)).await?;
        MetadataEntry::from_cache_entry(&entry).ok()?.exchange
    }

    // == Length ==
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn insert_if_newer(map: &mut HashMap<CacheKey, CacheEntry>, entry: CacheEntry) -> PutOutcome {
    match map.get(&entry.key) {
        Some(existing) if !entry.may_replace(existing) => PutOutcome::Rejected,
        _ => {
            map.insert(entry.key.clone(), entry);
            PutOutcome::Applied
        }
    }
}
