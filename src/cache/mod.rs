//! Cache Module
//!
//! Provides composite-key query caching with single-flight dispatch,
//! stale-time expiration and bounded least-recently-produced eviction.

mod entry;
mod facade;
mod hash;
mod key;
mod matcher;
mod stats;
mod store;


// Re-export public types
pub use entry::ProducerContext;
pub use facade::{ClearOptions, InvalidateOptions, QueryCache};
pub use hash::KeyHash;
pub use key::{KeySegment, QueryKey};
pub use matcher::partial_match;
pub use stats::CacheStats;
