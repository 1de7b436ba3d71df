//! Cache Statistics Module
//!
//! Tracks how fetch requests were answered: which tier hit, how many remote
//! batches were issued and how often persistence failed.

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Symbols answered fresh from the memory tier
    pub memory_hits: u64,
    /// Symbols answered fresh from the persistent tier
    pub persistent_hits: u64,
    /// Symbols that needed a remote call
    pub misses: u64,
    /// Symbols answered with an expired entry after a failed refresh
    pub stale_served: u64,
    /// Remote batch calls issued
    pub remote_batches: u64,
    /// Symbols that joined an in-flight call instead of issuing one
    pub joined_flights: u64,
    /// Writes dropped because a newer entry was already stored
    pub rejected_writes: u64,
    /// Persistent reads or writes that failed
    pub persistence_failures: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Fraction of symbols answered without a remote call.
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.persistent_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_persistent_hit(&mut self) {
        self.persistent_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_stale_served(&mut self) {
        self.stale_served += 1;
    }

    pub fn record_remote_batch(&mut self) {
        self.remote_batches += 1;
    }

    /// Records `count` symbols that attached to calls already in flight.
    pub fn record_joined_flights(&mut self, count: usize) {
        self.joined_flights += count as u64;
    }

    pub fn record_rejected_write(&mut self) {
        self.rejected_writes += 1;
    }

    pub fn record_persistence_failure(&mut self) {
        self.persistence_failures += 1;
    }
}
