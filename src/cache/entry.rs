//! Query Entry Module
//!
//! One cache slot per composite key: the last produced value, its
//! production timestamp and staleness window, and the single in-flight
//! dispatch shared by every concurrent caller.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::hash::KeyHash;
use crate::cache::key::QueryKey;
use crate::cache::store::QueryStore;
use crate::error::{CacheError, Result};

// == Type Aliases ==

/// Boxed producer stored on an entry so invalidation can re-dispatch it.
pub(crate) type ProducerFn<T> =
    Arc<dyn Fn(ProducerContext) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Handle to an in-flight dispatch; every concurrent caller awaits a clone
/// and observes the same settled outcome.
pub(crate) type SharedDispatch<T> = Shared<BoxFuture<'static, Result<T>>>;

// == Producer Context ==
/// Cancellation signal handed to every producer invocation.
///
/// Producers may poll [`ProducerContext::is_cancelled`] or await
/// [`ProducerContext::cancelled`] to stop early when the dispatch is
/// invalidated, cleared, or evicted. Ignoring the context is allowed: the
/// result of a cancelled dispatch is discarded instead of cached.
#[derive(Debug, Clone)]
pub struct ProducerContext {
    cancelled: watch::Receiver<bool>,
}

impl ProducerContext {
    fn new(cancelled: watch::Receiver<bool>) -> Self {
        Self { cancelled }
    }

    /// Context for pass-through invocations, which are never cancelled.
    pub(crate) fn detached() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { cancelled: rx }
    }

    /// Returns true once the owning dispatch has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves when the owning dispatch is cancelled.
    ///
    /// Never resolves for dispatches that reach commit uncancelled, so this
    /// is meant for `tokio::select!`-style races inside producers.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender dropped without signalling; treat as never cancelled.
            std::future::pending::<()>().await;
        }
    }
}

// == In-Flight Dispatch ==
/// The single running production task of an entry.
struct InFlightDispatch<T> {
    task: SharedDispatch<T>,
    cancel: watch::Sender<bool>,
}

// == Query Entry ==
/// Represents one cached query.
///
/// State is derived from the fields: no value and no dispatch is an empty
/// entry, a dispatch handle means production is in flight, and a value is
/// fresh until its stale window elapses. `value` is set if and only if
/// `produced_at` is set.
pub(crate) struct QueryEntry<T> {
    /// The original composite key, retained for partial-match scans
    key: QueryKey,
    /// The key's identity in the store's primary index
    hash: KeyHash,
    /// Producer reused by refetching invalidation
    producer: ProducerFn<T>,
    /// Staleness window frozen at creation, None = never stale
    stale_window: Option<Duration>,
    /// Insertion order, breaks eviction ties between equal timestamps
    insert_seq: u64,
    /// Last successfully produced value
    value: Option<T>,
    /// Timestamp of the last successful production
    produced_at: Option<Instant>,
    /// At most one running production task (single-flight)
    in_flight: Option<InFlightDispatch<T>>,
}

impl<T: Clone + Send + Sync + 'static> QueryEntry<T> {
    // == Constructor ==
    /// Creates an unset entry for a key.
    ///
    /// # Arguments
    /// * `key` - The composite key this entry caches
    /// * `hash` - The key's identity
    /// * `producer` - Producer invoked by dispatches for this entry
    /// * `stale_window` - Resolved staleness window, None = never stale
    /// * `insert_seq` - Store-assigned insertion sequence number
    pub(crate) fn new(
        key: QueryKey,
        hash: KeyHash,
        producer: ProducerFn<T>,
        stale_window: Option<Duration>,
        insert_seq: u64,
    ) -> Self {
        Self {
            key,
            hash,
            producer,
            stale_window,
            insert_seq,
            value: None,
            produced_at: None,
            in_flight: None,
        }
    }

    // == Accessors ==
    /// Returns the entry's composite key.
    pub(crate) fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Returns the entry's key identity.
    pub(crate) fn hash(&self) -> &KeyHash {
        &self.hash
    }

    /// Returns the timestamp of the last successful production.
    pub(crate) fn produced_at(&self) -> Option<Instant> {
        self.produced_at
    }

    /// Returns the store-assigned insertion sequence number.
    pub(crate) fn insert_seq(&self) -> u64 {
        self.insert_seq
    }

    /// Returns true when the entry holds a produced value.
    #[allow(dead_code)]
    pub(crate) fn has_value(&self) -> bool {
        self.value.is_some()
    }

    // == Freshness ==
    /// Returns true when the entry holds a value within its stale window.
    ///
    /// Boundary condition: a value is stale once the elapsed time since
    /// production is greater than or equal to the window, so a zero window
    /// means every access re-dispatches.
    pub(crate) fn is_fresh(&self) -> bool {
        match (self.produced_at, self.stale_window) {
            (Some(produced), Some(window)) => produced.elapsed() < window,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Returns a clone of the value when present and fresh.
    pub(crate) fn fresh_value(&self) -> Option<T> {
        if self.is_fresh() {
            self.value.clone()
        } else {
            None
        }
    }

    // == Dispatch Handling ==
    /// Returns a handle to the in-flight dispatch, if any.
    pub(crate) fn in_flight(&self) -> Option<SharedDispatch<T>> {
        self.in_flight.as_ref().map(|dispatch| dispatch.task.clone())
    }

    /// Starts a new production dispatch and returns its shared handle.
    ///
    /// Callers must have cancelled any previous dispatch first; the store
    /// lock must be held so the dispatch cannot commit before the entry is
    /// visible in the map.
    pub(crate) fn begin_dispatch(
        &mut self,
        store: Weak<RwLock<QueryStore<T>>>,
    ) -> SharedDispatch<T> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = run_dispatch(store, self.hash.clone(), Arc::clone(&self.producer), cancel_rx)
            .boxed()
            .shared();

        self.in_flight = Some(InFlightDispatch {
            task: task.clone(),
            cancel: cancel_tx,
        });
        task
    }

    /// Cancels the in-flight dispatch, if any.
    ///
    /// Returns true when a dispatch was actually cancelled. The signal is
    /// observed by the dispatch before it can mutate this entry, as both
    /// sides run under the store lock.
    pub(crate) fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(dispatch) => {
                let _ = dispatch.cancel.send(true);
                true
            }
            None => false,
        }
    }

    // == State Transitions ==
    /// Applies a successful production.
    pub(crate) fn complete(&mut self, value: T) {
        self.value = Some(value);
        self.produced_at = Some(Instant::now());
        self.in_flight = None;
    }

    /// Reverts the entry to unset after a failed production.
    pub(crate) fn reset_after_failure(&mut self) {
        self.value = None;
        self.produced_at = None;
        self.in_flight = None;
    }

    /// Clears the value and timestamp, leaving the entry record in place.
    pub(crate) fn clear_value(&mut self) {
        self.value = None;
        self.produced_at = None;
    }
}

impl<T> fmt::Debug for QueryEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEntry")
            .field("key", &self.key)
            .field("has_value", &self.value.is_some())
            .field("produced_at", &self.produced_at)
            .field("stale_window", &self.stale_window)
            .field("in_flight", &self.in_flight.is_some())
            .finish()
    }
}

// == Dispatch Task ==
/// Runs one production and commits its outcome to the entry.
///
/// The race between cancellation and a completing producer is settled at
/// commit time: the cancellation flag is written under the store lock and
/// read back here under the same lock, so a dispatch cancelled before its
/// commit never mutates the entry, even when the producer already finished.
async fn run_dispatch<T: Clone + Send + Sync + 'static>(
    store: Weak<RwLock<QueryStore<T>>>,
    hash: KeyHash,
    producer: ProducerFn<T>,
    cancel_rx: watch::Receiver<bool>,
) -> Result<T> {
    let outcome = {
        let produce = producer(ProducerContext::new(cancel_rx.clone()));
        let mut cancelled = cancel_rx.clone();
        tokio::select! {
            result = produce => result.map_err(CacheError::producer),
            _ = cancelled.wait_for(|flagged| *flagged) => Err(CacheError::Cancelled),
        }
    };

    let Some(store) = store.upgrade() else {
        return Err(CacheError::Cancelled);
    };
    let mut store = store.write().await;

    if *cancel_rx.borrow() {
        warn!(key = %hash, "discarding result of cancelled dispatch");
        return Err(CacheError::Cancelled);
    }

    match outcome {
        Ok(value) => {
            // Uncancelled implies this dispatch is still the entry's
            // current one; every replacement path cancels first.
            let Some(entry) = store.get_mut(&hash) else {
                return Err(CacheError::Cancelled);
            };
            entry.complete(value.clone());
            debug!(key = %hash, "dispatch committed fresh value");
            Ok(value)
        }
        Err(err) => {
            if let Some(entry) = store.get_mut(&hash) {
                entry.reset_after_failure();
            }
            warn!(key = %hash, error = %err, "producer failed, entry reverts to unset");
            Err(err)
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;
    use std::sync::Arc;

    fn fixed_producer(value: u32) -> ProducerFn<u32> {
        Arc::new(move |_ctx| async move { Ok(value) }.boxed())
    }

    fn entry_with_window(stale_window: Option<Duration>) -> QueryEntry<u32> {
        let key = query_key!["entry", "test"];
        let hash = KeyHash::of(&key);
        QueryEntry::new(key, hash, fixed_producer(1), stale_window, 0)
    }

    #[test]
    fn test_new_entry_is_unset() {
        let entry = entry_with_window(None);
        assert!(!entry.has_value());
        assert!(entry.produced_at().is_none());
        assert!(!entry.is_fresh());
        assert!(entry.fresh_value().is_none());
        assert!(entry.in_flight().is_none());
    }

    #[test]
    fn test_complete_sets_value_and_timestamp() {
        let mut entry = entry_with_window(None);
        entry.complete(7);

        assert!(entry.has_value());
        assert!(entry.produced_at().is_some());
        assert_eq!(entry.fresh_value(), Some(7));
    }

    #[test]
    fn test_clear_value_keeps_invariant() {
        let mut entry = entry_with_window(None);
        entry.complete(7);
        entry.clear_value();

        assert!(!entry.has_value());
        assert!(entry.produced_at().is_none());
        assert!(entry.fresh_value().is_none());
    }

    #[test]
    fn test_reset_after_failure_unsets_entry() {
        let mut entry = entry_with_window(None);
        entry.complete(7);
        entry.reset_after_failure();

        assert!(!entry.has_value());
        assert!(entry.produced_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_window_never_goes_stale() {
        let mut entry = entry_with_window(None);
        entry.complete(7);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(entry.is_fresh());
        assert_eq!(entry.fresh_value(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_goes_stale_at_window_boundary() {
        let mut entry = entry_with_window(Some(Duration::from_millis(100)));
        entry.complete(7);
        assert!(entry.is_fresh());

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(entry.is_fresh());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!entry.is_fresh());
        assert!(entry.fresh_value().is_none());
    }

    #[test]
    fn test_zero_window_is_always_stale() {
        let mut entry = entry_with_window(Some(Duration::ZERO));
        entry.complete(7);

        assert!(entry.has_value());
        assert!(!entry.is_fresh());
        assert!(entry.fresh_value().is_none());
    }

    #[tokio::test]
    async fn test_begin_dispatch_installs_handle() {
        let store = Arc::new(RwLock::new(QueryStore::<u32>::new()));
        let mut entry = entry_with_window(None);

        let _task = entry.begin_dispatch(Arc::downgrade(&store));
        assert!(entry.in_flight().is_some());
    }

    #[tokio::test]
    async fn test_cancel_in_flight_takes_the_handle() {
        let store = Arc::new(RwLock::new(QueryStore::<u32>::new()));
        let mut entry = entry_with_window(None);

        let _task = entry.begin_dispatch(Arc::downgrade(&store));
        assert!(entry.cancel_in_flight());
        assert!(entry.in_flight().is_none());
        assert!(!entry.cancel_in_flight());
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_resolves_cancelled_for_waiters() {
        let store = Arc::new(RwLock::new(QueryStore::<u32>::new()));
        let mut entry = entry_with_window(None);

        let task = entry.begin_dispatch(Arc::downgrade(&store));
        entry.cancel_in_flight();

        let result = task.await;
        assert!(matches!(result, Err(CacheError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dispatch_for_dropped_store_resolves_cancelled() {
        let store = Arc::new(RwLock::new(QueryStore::<u32>::new()));
        let mut entry = entry_with_window(None);

        let task = entry.begin_dispatch(Arc::downgrade(&store));
        drop(store);

        let result = task.await;
        assert!(matches!(result, Err(CacheError::Cancelled)));
    }
}
