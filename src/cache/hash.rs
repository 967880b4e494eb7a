//! Key Hashing Module
//!
//! Deterministic identity digests for composite keys, used for exact-match
//! lookup in the store's primary index.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::cache::key::QueryKey;

// == Key Hash ==
/// SHA-256 identity of a composite key, rendered as lowercase hex.
///
/// The digest covers the canonical JSON serialization of the segment
/// sequence. Segment order and map-field insertion order are preserved, not
/// sorted: two map segments with equal fields inserted in different orders
/// hash to different identities even though they partial-match each other.
/// Identity is only used for exact lookups, so this stays consistent with
/// the structure-aware matching in [`crate::cache::partial_match`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyHash(String);

impl KeyHash {
    /// Computes the identity of a key.
    ///
    /// Pure and deterministic: equal serializations always produce equal
    /// hashes, and distinct serializations collide only with SHA-256
    /// probability.
    pub fn of(key: &QueryKey) -> Self {
        let canonical = serde_json::to_vec(key.segments())
            .expect("JSON value serialization cannot fail");

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let digest = hasher.finalize();

        Self(hex::encode(digest))
    }

    /// Returns the hex-encoded digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
