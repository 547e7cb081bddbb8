//! Entity identifier ordering.
//!
//! Identifiers are opaque strings, but the server hands out list element ids
//! that compare first by length and then lexicographically. Range
//! bookkeeping and paginated reads rely on exactly this ordering, so it is
//! part of the wire contract with the remote API: a shorter id is always
//! smaller, and ids of equal length compare by code point.
//!
//! Length is counted in characters to agree with SQLite's `LENGTH()`, which
//! the range scans use for `ORDER BY`. Server-generated ids are ASCII, where
//! the two notions coincide.

use std::cmp::Ordering;

/// Smallest id the server generates (12 chars, below every generated id).
pub const GENERATED_MIN_ID: &str = "------------";

/// Largest id the server generates (12 chars, above every generated id).
pub const GENERATED_MAX_ID: &str = "zzzzzzzzzzzz";

/// Compare two ids under the length-then-lexicographic ordering.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    a.chars()
        .count()
        .cmp(&b.chars().count())
        .then_with(|| a.cmp(b))
}

/// True if `a` is strictly bigger than `b`.
pub fn first_bigger_than_second(a: &str, b: &str) -> bool {
    compare_ids(a, b) == Ordering::Greater
}

/// True if `a` is equal to or bigger than `b`.
pub fn first_bigger_or_eq(a: &str, b: &str) -> bool {
    a == b || first_bigger_than_second(a, b)
}
