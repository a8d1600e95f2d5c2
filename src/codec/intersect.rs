//! Merge-walk set operations over packed posting arrays.
//!
//! Both operations pair up words from two sorted arrays by their
//! `(key, bucket)` prefix in a single O(n + m) pass. The shifted variant
//! pairs a left word with the right word a fixed number of buckets away
//! inside the same document, which is how the phrase engine matches
//! positions across a bucket boundary.

use std::cmp::Ordering;

use super::{PAYLOAD_MSB_BITS, bucket, key, prefix};
use crate::error::{KontosError, Result};

const MAX_BUCKET: i64 = (1i64 << PAYLOAD_MSB_BITS) - 1;

/// Pair up words of `lhs` and `rhs` that share a `(key, bucket)` prefix.
///
/// The returned arrays have equal length; entry `i` of each holds the
/// matching word from the corresponding input. Returns
/// [`KontosError::InvariantViolation`] if either input repeats a
/// `(key, bucket)` slot at a match point.
pub fn intersect(lhs: &[u64], rhs: &[u64]) -> Result<(Vec<u64>, Vec<u64>)> {
    let mut out_lhs = Vec::new();
    let mut out_rhs = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < lhs.len() && j < rhs.len() {
        match prefix(lhs[i]).cmp(&prefix(rhs[j])) {
            Ordering::Equal => {
                check_distinct_slot(lhs, i)?;
                check_distinct_slot(rhs, j)?;
                out_lhs.push(lhs[i]);
                out_rhs.push(rhs[j]);
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    Ok((out_lhs, out_rhs))
}

/// Pair up words of `lhs` with the `rhs` words `rshift` buckets away in
/// the same document.
///
/// `rshift = -1` pairs a left bucket with the right bucket immediately
/// following it in position order. The key field never participates in
/// the shift: a right word in bucket 0 has no predecessor, so it cannot
/// match anything under `rshift = -1`.
pub fn intersect_rshift(lhs: &[u64], rhs: &[u64], rshift: i64) -> Result<(Vec<u64>, Vec<u64>)> {
    let mut out_lhs = Vec::new();
    let mut out_rhs = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < lhs.len() && j < rhs.len() {
        let shifted = bucket(rhs[j]) as i64 + rshift;
        if shifted < 0 || shifted > MAX_BUCKET {
            j += 1;
            continue;
        }
        let rhs_prefix = (u64::from(key(rhs[j])) << PAYLOAD_MSB_BITS) | shifted as u64;
        match prefix(lhs[i]).cmp(&rhs_prefix) {
            Ordering::Equal => {
                check_distinct_slot(lhs, i)?;
                check_distinct_slot(rhs, j)?;
                out_lhs.push(lhs[i]);
                out_rhs.push(rhs[j]);
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    Ok((out_lhs, out_rhs))
}

fn check_distinct_slot(words: &[u64], idx: usize) -> Result<()> {
    if idx + 1 < words.len() && prefix(words[idx + 1]) == prefix(words[idx]) {
        return Err(KontosError::invariant(format!(
            "posting array repeats slot (doc {}, bucket {})",
            key(words[idx]),
            bucket(words[idx])
        )));
    }
    Ok(())
}
