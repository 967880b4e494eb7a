//! Query Key Module
//!
//! Composite keys addressing cached queries: ordered sequences of JSON-like
//! segments (strings, numbers, booleans, or nested maps).

use std::fmt;

/// A single component of a composite key.
///
/// Represented as a `serde_json::Value` so callers can mix primitive and
/// structured segments freely. Map segments keep their field insertion
/// order, which matters for hashing (see [`crate::cache::KeyHash`]).
pub type KeySegment = serde_json::Value;

// == Query Key ==
/// An ordered sequence of segments identifying one cached query.
///
/// Keys may be built empty, but every cache operation taking a full key
/// rejects an empty one before doing any work. The [`query_key!`] macro is
/// the usual way to build keys from JSON literals:
///
/// `query_key!["users", "list", {"page": 1}]`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    segments: Vec<KeySegment>,
}

impl QueryKey {
    // == Constructor ==
    /// Creates a key from a sequence of segments.
    pub fn new(segments: Vec<KeySegment>) -> Self {
        Self { segments }
    }

    /// Creates a key from a JSON value.
    ///
    /// An array becomes the segment sequence; any other value becomes a
    /// single-segment key.
    pub fn from_value(value: KeySegment) -> Self {
        match value {
            serde_json::Value::Array(segments) => Self { segments },
            other => Self {
                segments: vec![other],
            },
        }
    }

    // == Accessors ==
    /// Returns the key's segments in order.
    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true when the key has no segments.
    ///
    /// Empty keys are a contract violation for cache operations and are
    /// rejected with [`crate::CacheError::InvalidKey`].
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl From<Vec<KeySegment>> for QueryKey {
    fn from(segments: Vec<KeySegment>) -> Self {
        Self::new(segments)
    }
}

impl FromIterator<KeySegment> for QueryKey {
    fn from_iter<I: IntoIterator<Item = KeySegment>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.segments) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => Err(fmt::Error),
        }
    }
}

// == Key Macro ==
/// Builds a [`QueryKey`] from JSON-literal segments.
///
/// Accepts anything `serde_json::json!` accepts inside an array:
/// `query_key!["users", 42, {"active": true}]`.
#[macro_export]
macro_rules! query_key {
    ($($segment:tt)*) => {
        $crate::QueryKey::from_value(::serde_json::json!([$($segment)*]))
    };
}
