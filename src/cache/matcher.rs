//! Key Matching Module
//!
//! Structural partial matching between composite keys, used by invalidation
//! to select entries covered by a shorter pattern key.

use crate::cache::key::{KeySegment, QueryKey};

// == Partial Match ==
/// Returns true when `pattern` structurally covers `candidate`.
///
/// Rules, applied recursively:
/// - identical primitive segments (same JSON type and value) match;
/// - differing types never match (the string `"1"` does not match the
///   number `1`);
/// - sequences match when the pattern is no longer than the candidate and
///   every pattern element matches the candidate element at the same
///   position (the pattern is a prefix);
/// - maps match when every pattern field exists in the candidate with a
///   recursively matching value (the pattern is a subset; candidate extras
///   are ignored).
///
/// The root segment sequences follow the prefix rule, so
/// `["users"]` covers `["users", "list"]` but not the other way around.
pub fn partial_match(pattern: &QueryKey, candidate: &QueryKey) -> bool {
    sequence_matches(pattern.segments(), candidate.segments())
}

fn sequence_matches(pattern: &[KeySegment], candidate: &[KeySegment]) -> bool {
    if pattern.len() > candidate.len() {
        return false;
    }
    pattern
        .iter()
        .zip(candidate)
        .all(|(p, c)| segment_matches(p, c))
}

fn segment_matches(pattern: &KeySegment, candidate: &KeySegment) -> bool {
    match (pattern, candidate) {
        (KeySegment::Array(p), KeySegment::Array(c)) => sequence_matches(p, c),
        (KeySegment::Object(p), KeySegment::Object(c)) => p
            .iter()
            .all(|(field, value)| c.get(field).map_or(false, |cv| segment_matches(value, cv))),
        _ => pattern == candidate,
    }
}
