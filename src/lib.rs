//! Query Cache - An in-process async result cache for composite-keyed queries
//!
//! Producers run at most once per key at a time (single-flight), values
//! expire by stale time, and the store is bounded with
//! least-recently-produced eviction.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{
    partial_match, CacheStats, ClearOptions, InvalidateOptions, KeyHash, KeySegment,
    ProducerContext, QueryCache, QueryKey,
};
pub use config::{CacheOptions, ConfigureOptions};
pub use error::{CacheError, Result};
