//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, coalesced
//! waiters, evictions, and cancellations.

use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of accesses served from a fresh cached value
    pub hits: u64,
    /// Number of accesses that required dispatching a producer
    pub misses: u64,
    /// Number of accesses that joined an already in-flight dispatch
    pub coalesced: u64,
    /// Number of entries evicted by the size bound
    pub evictions: u64,
    /// Number of in-flight dispatches cancelled by invalidation, clearing,
    /// or eviction
    pub cancellations: u64,
    /// Current number of entries in the cache
    pub entries: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been
    /// made. Coalesced accesses are excluded: they neither found a settled
    /// value nor paid for a new dispatch.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Coalesced ==
    /// Increments the coalesced-access counter.
    pub fn record_coalesced(&mut self) {
        self.coalesced += 1;
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Cancellation ==
    /// Increments the cancellation counter.
    pub fn record_cancellation(&mut self) {
        self.cancellations += 1;
    }
}
