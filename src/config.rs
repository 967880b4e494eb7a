//! Configuration Module
//!
//! Construction-time cache options and runtime policy updates.

use std::env;
use std::time::Duration;

// == Cache Options ==
/// Construction-time options for a query cache.
///
/// All values can also be loaded from environment variables with sensible
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Maximum number of entries, None = unbounded
    pub max_size: Option<usize>,
    /// Default staleness window, None = values never go stale
    pub stale_time: Option<Duration>,
    /// Whether invalidation re-dispatches producers by default
    pub refetch_on_invalidate: bool,
}

impl CacheOptions {
    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERY_CACHE_MAX_SIZE` - Maximum entries (default: unbounded)
    /// - `QUERY_CACHE_STALE_TIME_MS` - Default stale window in milliseconds
    ///   (default: unbounded)
    /// - `QUERY_CACHE_REFETCH_ON_INVALIDATE` - Refetch default (default: true)
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            max_size: env::var("QUERY_CACHE_MAX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok()),
            stale_time: env::var("QUERY_CACHE_STALE_TIME_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            refetch_on_invalidate: env::var("QUERY_CACHE_REFETCH_ON_INVALIDATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }

    // == Builders ==
    /// Sets the maximum entry count.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the default staleness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    /// Sets whether invalidation re-dispatches producers by default.
    pub fn with_refetch_on_invalidate(mut self, refetch: bool) -> Self {
        self.refetch_on_invalidate = refetch;
        self
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_size: None,
            stale_time: None,
            refetch_on_invalidate: true,
        }
    }
}

// == Configure Options ==
/// Runtime policy updates for [`crate::QueryCache::configure`].
///
/// Fields are raw signed values: a negative value is silently ignored and
/// the current setting kept. Unset fields leave the corresponding setting
/// unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    /// New maximum entry count; negative values are ignored
    pub max_size: Option<i64>,
    /// New default stale window in milliseconds; negative values are ignored
    pub stale_time_ms: Option<i64>,
}

impl ConfigureOptions {
    // == Builders ==
    /// Sets the maximum entry count to apply.
    pub fn with_max_size(mut self, max_size: i64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the default stale window in milliseconds to apply.
    pub fn with_stale_time_ms(mut self, stale_time_ms: i64) -> Self {
        self.stale_time_ms = Some(stale_time_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_is_unbounded() {
        let options = CacheOptions::default();
        assert_eq!(options.max_size, None);
        assert_eq!(options.stale_time, None);
        assert!(options.refetch_on_invalidate);
    }

    #[test]
    fn test_options_builders() {
        let options = CacheOptions::default()
            .with_max_size(10)
            .with_stale_time(Duration::from_millis(250))
            .with_refetch_on_invalidate(false);

        assert_eq!(options.max_size, Some(10));
        assert_eq!(options.stale_time, Some(Duration::from_millis(250)));
        assert!(!options.refetch_on_invalidate);
    }

    #[test]
    fn test_options_from_env() {
        // Set, read, and remove the variables in one test to avoid
        // interference between parallel test threads.
        env::set_var("QUERY_CACHE_MAX_SIZE", "50");
        env::set_var("QUERY_CACHE_STALE_TIME_MS", "1500");
        env::set_var("QUERY_CACHE_REFETCH_ON_INVALIDATE", "false");

        let options = CacheOptions::from_env();
        assert_eq!(options.max_size, Some(50));
        assert_eq!(options.stale_time, Some(Duration::from_millis(1500)));
        assert!(!options.refetch_on_invalidate);

        env::set_var("QUERY_CACHE_MAX_SIZE", "not a number");
        let options = CacheOptions::from_env();
        assert_eq!(options.max_size, None);

        env::remove_var("QUERY_CACHE_MAX_SIZE");
        env::remove_var("QUERY_CACHE_STALE_TIME_MS");
        env::remove_var("QUERY_CACHE_REFETCH_ON_INVALIDATE");

        let options = CacheOptions::from_env();
        assert_eq!(options, CacheOptions::default());
    }

    #[test]
    fn test_configure_options_builders() {
        let options = ConfigureOptions::default()
            .with_max_size(5)
            .with_stale_time_ms(100);

        assert_eq!(options.max_size, Some(5));
        assert_eq!(options.stale_time_ms, Some(100));
    }

    #[test]
    fn test_configure_options_default_changes_nothing() {
        let options = ConfigureOptions::default();
        assert_eq!(options.max_size, None);
        assert_eq!(options.stale_time_ms, None);
    }
}
