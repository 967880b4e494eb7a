//! Query Cache Module
//!
//! The public async surface. Wraps the store in a shared lock that is held
//! only for synchronous state transitions; producers always run with the
//! lock released so concurrent callers on other keys are never blocked.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::cache::entry::{ProducerContext, ProducerFn, QueryEntry};
use crate::cache::hash::KeyHash;
use crate::cache::key::QueryKey;
use crate::cache::stats::CacheStats;
use crate::cache::store::{EntryAccess, QueryStore};
use crate::config::{CacheOptions, ConfigureOptions};
use crate::error::{CacheError, Result};

// == Call Options ==

/// Options for [`QueryCache::invalidate`].
#[derive(Debug, Clone, Default)]
pub struct InvalidateOptions {
    /// Pattern selecting entries to invalidate; None selects every entry
    pub key: Option<QueryKey>,
    /// Whether to re-dispatch producers, overriding the cache-wide default
    pub refetch: Option<bool>,
    /// Match the exact key identity instead of structural prefixes
    pub exact: bool,
}

impl InvalidateOptions {
    /// Sets the pattern key.
    pub fn with_key(mut self, key: QueryKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Overrides the cache-wide refetch default for this call.
    pub fn with_refetch(mut self, refetch: bool) -> Self {
        self.refetch = Some(refetch);
        self
    }

    /// Switches between identity matching and structural prefix matching.
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }
}

/// Options for [`QueryCache::clear`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearOptions {
    /// Also revert `max_size` and the default stale time to unbounded
    pub reset_options: bool,
}

impl ClearOptions {
    /// Sets whether clearing also reverts the cache policy.
    pub fn with_reset_options(mut self, reset_options: bool) -> Self {
        self.reset_options = reset_options;
        self
    }
}

// == Query Cache ==

/// An in-process async cache keyed by composite query keys.
///
/// Values are produced on demand by caller-supplied async producers,
/// retained until their staleness window elapses, and deduplicated so that
/// concurrent callers of the same key share a single in-flight production.
/// Cloning the cache produces another handle to the same shared state.
pub struct QueryCache<T> {
    store: Arc<RwLock<QueryStore<T>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> QueryCache<T> {
    // == Constructors ==
    /// Creates an unbounded cache whose values never go stale.
    pub fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    /// Creates a cache with the given options.
    pub fn with_options(options: CacheOptions) -> Self {
        Self {
            store: Arc::new(RwLock::new(QueryStore::with_options(options))),
        }
    }

    // == Read Path ==
    /// Returns the cached value for `key`, producing it when necessary.
    ///
    /// A fresh cached value is returned directly. A stale or absent value
    /// dispatches `producer` exactly once, no matter how many callers ask
    /// concurrently; they all await the same dispatch and observe the same
    /// outcome. When the cache is already at capacity the call degrades to
    /// a plain producer invocation and nothing is cached (fail-open).
    ///
    /// The producer and staleness window stick to the entry they create:
    /// both arguments are ignored for as long as an entry for `key` lives,
    /// including stale re-dispatches and refetching invalidation.
    ///
    /// # Arguments
    /// * `key` - Non-empty composite key identifying the query
    /// * `producer` - Async producer invoked on misses, given a
    ///   [`ProducerContext`] that signals cancellation
    /// * `stale_time` - Staleness window for a newly created entry,
    ///   overriding the cache default; None defers to that default
    ///
    /// # Returns
    /// The fresh value, [`CacheError::InvalidKey`] for an empty key,
    /// [`CacheError::Producer`] when the dispatched producer fails, or
    /// [`CacheError::Cancelled`] when the awaited dispatch is invalidated
    /// away mid-flight.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: QueryKey,
        producer: F,
        stale_time: Option<Duration>,
    ) -> Result<T>
    where
        F: Fn(ProducerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }
        let hash = KeyHash::of(&key);
        let producer: ProducerFn<T> = Arc::new(move |ctx| producer(ctx).boxed());

        let access = {
            let mut store = self.store.write().await;

            if store.is_full() {
                store.record_miss();
                trace!(%key, "store at capacity, passing through to producer");
                None
            } else if let Some(access) = store.access(&hash, Arc::downgrade(&self.store)) {
                Some(access)
            } else {
                let stale_window = store.resolve_stale_window(stale_time);
                let seq = store.next_insert_seq();
                let mut entry =
                    QueryEntry::new(key.clone(), hash, Arc::clone(&producer), stale_window, seq);
                let task = entry.begin_dispatch(Arc::downgrade(&self.store));
                store.record_miss();
                store.insert(entry);
                debug!(%key, "created entry, dispatching producer");
                Some(EntryAccess::Dispatch(task))
            }
        };

        match access {
            None => match producer(ProducerContext::detached()).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    let err = CacheError::producer(err);
                    warn!(%key, error = %err, "pass-through producer failed");
                    Err(err)
                }
            },
            Some(EntryAccess::Fresh(value)) => Ok(value),
            Some(EntryAccess::Join(task)) | Some(EntryAccess::Dispatch(task)) => task.await,
        }
    }

    // == Invalidation ==
    /// Invalidates every entry selected by `options` and returns how many
    /// were invalidated.
    ///
    /// Without a key every entry is selected; with one, entries whose keys
    /// the pattern structurally prefixes are selected, or only the exact
    /// identity match when `exact` is set. Selected entries lose their
    /// value and have any in-flight dispatch cancelled. When refetching is
    /// enabled (the construction-time default unless overridden per call)
    /// each entry's stored producer is re-dispatched and awaited before
    /// this call returns; refetch failures are logged, not propagated, and
    /// leave the entry unset.
    pub async fn invalidate(&self, options: InvalidateOptions) -> usize {
        let (targets, refetch) = {
            let store = self.store.read().await;
            (
                store.matching_hashes(options.key.as_ref(), options.exact),
                options.refetch.unwrap_or(store.refetch_on_invalidate()),
            )
        };

        let mut invalidated = 0;
        for hash in &targets {
            let mut store = self.store.write().await;
            if !store.contains(hash) {
                // Concurrently evicted or cleared since the scan.
                continue;
            }
            let dispatch = store.invalidate_entry(hash, refetch, Arc::downgrade(&self.store));
            drop(store);
            invalidated += 1;

            if let Some(task) = dispatch {
                if let Err(err) = task.await {
                    warn!(key = %hash, error = %err, "refetch after invalidation failed");
                }
            }
        }

        match &options.key {
            Some(pattern) => {
                debug!(%pattern, exact = options.exact, invalidated, "invalidation complete")
            }
            None => debug!(invalidated, "invalidated every entry"),
        }
        invalidated
    }

    // == Maintenance ==
    /// Destroys every entry, cancelling in-flight dispatches.
    pub async fn clear(&self, options: ClearOptions) {
        let mut store = self.store.write().await;
        store.clear(options.reset_options);
    }

    /// Updates the size bound and default staleness window at runtime.
    ///
    /// Negative values are ignored per field. Shrinking below the current
    /// entry count evicts immediately.
    pub async fn configure(&self, options: ConfigureOptions) {
        let mut store = self.store.write().await;
        store.configure(&options);
    }

    // == Inspection ==
    /// Returns the current number of entries.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Returns true when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Returns true when an entry exists for exactly this key.
    pub async fn contains(&self, key: &QueryKey) -> bool {
        self.store.read().await.contains(&KeyHash::of(key))
    }

    /// Returns a snapshot of the cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    /// Returns the current maximum entry count, None = unbounded.
    pub async fn max_size(&self) -> Option<usize> {
        self.store.read().await.max_size()
    }

    /// Returns the current default staleness window, None = never stale.
    pub async fn default_stale_time(&self) -> Option<Duration> {
        self.store.read().await.default_stale_time()
    }
}
