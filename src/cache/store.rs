//! Query Store Module
//!
//! Bounded mapping from key identity to entries, owning the eviction policy
//! and store-wide configuration.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cache::entry::{QueryEntry, SharedDispatch};
use crate::cache::hash::KeyHash;
use crate::cache::key::QueryKey;
use crate::cache::matcher::partial_match;
use crate::cache::stats::CacheStats;
use crate::config::{CacheOptions, ConfigureOptions};

// == Entry Access ==
/// Outcome of looking up an existing entry for a read.
pub(crate) enum EntryAccess<T> {
    /// A fresh value served without dispatching
    Fresh(T),
    /// An already running dispatch to await (single-flight coalescing)
    Join(SharedDispatch<T>),
    /// A dispatch started by this access
    Dispatch(SharedDispatch<T>),
}

// == Query Store ==
/// Bounded entry storage with least-recently-produced eviction.
pub(crate) struct QueryStore<T> {
    /// Identity-keyed entry storage
    entries: HashMap<KeyHash, QueryEntry<T>>,
    /// Monotonic counter assigning insertion order to entries
    insert_seq: u64,
    /// Maximum number of entries, None = unbounded
    max_size: Option<usize>,
    /// Default staleness window for new entries, None = never stale
    default_stale_time: Option<Duration>,
    /// Whether invalidation re-dispatches producers by default
    refetch_on_invalidate: bool,
    /// Performance statistics
    stats: CacheStats,
}

impl<T: Clone + Send + Sync + 'static> QueryStore<T> {
    // == Constructors ==
    /// Creates an unbounded store with default options.
    #[allow(dead_code)]
    pub(crate) fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    /// Creates a store with the given options.
    pub(crate) fn with_options(options: CacheOptions) -> Self {
        Self {
            entries: HashMap::new(),
            insert_seq: 0,
            max_size: options.max_size,
            default_stale_time: options.stale_time,
            refetch_on_invalidate: options.refetch_on_invalidate,
            stats: CacheStats::new(),
        }
    }

    // == Capacity ==
    /// Returns true when the store is at or above its maximum size.
    ///
    /// Reads at or above capacity bypass the cache entirely (fail-open), so
    /// a `max_size` of zero disables caching altogether.
    pub(crate) fn is_full(&self) -> bool {
        self.max_size
            .map_or(false, |max_size| self.entries.len() >= max_size)
    }

    /// Returns the current number of entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the store holds no entries.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Lookup ==
    /// Returns true when an entry exists for the given identity.
    pub(crate) fn contains(&self, hash: &KeyHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Returns a mutable reference to the entry for an identity.
    pub(crate) fn get_mut(&mut self, hash: &KeyHash) -> Option<&mut QueryEntry<T>> {
        self.entries.get_mut(hash)
    }

    // == Access ==
    /// Resolves a read against an existing entry.
    ///
    /// Serves the fresh value when there is one, joins an in-flight
    /// dispatch when production is already running, and otherwise starts a
    /// new dispatch for a stale or unset entry. Returns None when no entry
    /// exists for the identity.
    pub(crate) fn access(
        &mut self,
        hash: &KeyHash,
        store: Weak<RwLock<QueryStore<T>>>,
    ) -> Option<EntryAccess<T>> {
        let entry = self.entries.get_mut(hash)?;

        let access = if let Some(task) = entry.in_flight() {
            EntryAccess::Join(task)
        } else if let Some(value) = entry.fresh_value() {
            EntryAccess::Fresh(value)
        } else {
            EntryAccess::Dispatch(entry.begin_dispatch(store))
        };

        match &access {
            EntryAccess::Fresh(_) => {
                self.stats.record_hit();
                trace!(key = %hash, "serving fresh value");
            }
            EntryAccess::Join(_) => {
                self.stats.record_coalesced();
                trace!(key = %hash, "joining in-flight dispatch");
            }
            EntryAccess::Dispatch(_) => {
                self.stats.record_miss();
                debug!(key = %hash, "value stale or unset, dispatching producer");
            }
        }
        Some(access)
    }

    // == Insert ==
    /// Allocates the next insertion sequence number.
    pub(crate) fn next_insert_seq(&mut self) -> u64 {
        let seq = self.insert_seq;
        self.insert_seq += 1;
        seq
    }

    /// Inserts a new entry and enforces the size bound.
    ///
    /// Callers check capacity before creating the entry, so the eviction
    /// sweep here only fires when concurrent inserts race past that check.
    pub(crate) fn insert(&mut self, entry: QueryEntry<T>) {
        trace!(key = %entry.hash(), "inserting entry");
        self.entries.insert(entry.hash().clone(), entry);
        self.evict_over_capacity();
    }

    // == Invalidate ==
    /// Collects the identities selected by an invalidation pattern.
    ///
    /// No pattern selects every entry. An exact pattern selects at most the
    /// single identity match; otherwise entries are selected by structural
    /// partial matching against their original keys.
    pub(crate) fn matching_hashes(&self, pattern: Option<&QueryKey>, exact: bool) -> Vec<KeyHash> {
        match pattern {
            None => self.entries.keys().cloned().collect(),
            Some(pattern) if exact => {
                let hash = KeyHash::of(pattern);
                if self.entries.contains_key(&hash) {
                    vec![hash]
                } else {
                    Vec::new()
                }
            }
            Some(pattern) => self
                .entries
                .values()
                .filter(|entry| partial_match(pattern, entry.key()))
                .map(|entry| entry.hash().clone())
                .collect(),
        }
    }

    /// Invalidates one entry: cancels its dispatch, clears its value, and
    /// optionally starts a refetch from the stored producer.
    ///
    /// Returns the refetch dispatch to await, if one was started. The entry
    /// record itself stays in the store either way.
    pub(crate) fn invalidate_entry(
        &mut self,
        hash: &KeyHash,
        refetch: bool,
        store: Weak<RwLock<QueryStore<T>>>,
    ) -> Option<SharedDispatch<T>> {
        let entry = self.entries.get_mut(hash)?;

        let cancelled = entry.cancel_in_flight();
        entry.clear_value();
        let dispatch = if refetch {
            Some(entry.begin_dispatch(store))
        } else {
            None
        };

        if cancelled {
            self.stats.record_cancellation();
        }
        trace!(key = %hash, cancelled, refetch, "entry invalidated");
        dispatch
    }

    // == Eviction ==
    /// Evicts entries until the size bound holds again.
    ///
    /// Victims are ordered by production timestamp ascending (least
    /// recently produced first); entries that never produced sort before
    /// all produced ones, and ties fall back to insertion order. Evicted
    /// in-flight dispatches are cancelled.
    pub(crate) fn evict_over_capacity(&mut self) -> usize {
        let Some(max_size) = self.max_size else {
            return 0;
        };
        if self.entries.len() <= max_size {
            return 0;
        }
        let excess = self.entries.len() - max_size;

        let mut candidates: Vec<(Option<Instant>, u64, KeyHash)> = self
            .entries
            .values()
            .map(|entry| (entry.produced_at(), entry.insert_seq(), entry.hash().clone()))
            .collect();
        candidates.sort_by_key(|(produced_at, insert_seq, _)| (*produced_at, *insert_seq));

        for (_, _, hash) in candidates.into_iter().take(excess) {
            if let Some(mut entry) = self.entries.remove(&hash) {
                if entry.cancel_in_flight() {
                    self.stats.record_cancellation();
                }
                self.stats.record_eviction();
                debug!(key = %hash, "evicted least recently produced entry");
            }
        }
        excess
    }

    // == Clear ==
    /// Destroys every entry, cancelling in-flight dispatches.
    ///
    /// With `reset_options`, the size bound and default stale window revert
    /// to unbounded.
    pub(crate) fn clear(&mut self, reset_options: bool) {
        for entry in self.entries.values_mut() {
            if entry.cancel_in_flight() {
                self.stats.record_cancellation();
            }
        }
        let dropped = self.entries.len();
        self.entries.clear();

        if reset_options {
            self.max_size = None;
            self.default_stale_time = None;
        }
        debug!(dropped, reset_options, "cache cleared");
    }

    // == Configuration ==
    /// Applies runtime policy updates.
    ///
    /// Negative values are ignored per field rather than rejected. When the
    /// new size bound is below the current entry count, the store evicts
    /// down to it immediately.
    pub(crate) fn configure(&mut self, options: &ConfigureOptions) {
        if let Some(max_size) = options.max_size {
            if max_size >= 0 {
                self.max_size = Some(max_size as usize);
            } else {
                debug!(max_size, "ignoring negative max_size");
            }
        }
        if let Some(stale_time_ms) = options.stale_time_ms {
            if stale_time_ms >= 0 {
                self.default_stale_time = Some(Duration::from_millis(stale_time_ms as u64));
            } else {
                debug!(stale_time_ms, "ignoring negative stale_time");
            }
        }

        let evicted = self.evict_over_capacity();
        if evicted > 0 {
            debug!(evicted, "entry count trimmed to new max_size");
        }
    }

    /// Resolves the staleness window for a new entry.
    ///
    /// A per-call override takes precedence over the store default.
    pub(crate) fn resolve_stale_window(&self, per_call: Option<Duration>) -> Option<Duration> {
        per_call.or(self.default_stale_time)
    }

    // == Accessors ==
    /// Returns the current maximum entry count, None = unbounded.
    pub(crate) fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Returns the current default staleness window, None = never stale.
    pub(crate) fn default_stale_time(&self) -> Option<Duration> {
        self.default_stale_time
    }

    /// Returns whether invalidation re-dispatches producers by default.
    pub(crate) fn refetch_on_invalidate(&self) -> bool {
        self.refetch_on_invalidate
    }

    // == Stats ==
    /// Returns a snapshot of the current statistics.
    pub(crate) fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.entries = self.entries.len() as u64;
        stats
    }

    /// Increments the hit counter.
    #[allow(dead_code)]
    pub(crate) fn record_hit(&mut self) {
        self.stats.record_hit();
    }

    /// Increments the miss counter.
    pub(crate) fn record_miss(&mut self) {
        self.stats.record_miss();
    }
}
