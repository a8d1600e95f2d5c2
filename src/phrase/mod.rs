//! Phrase-frequency evaluation over packed posting arrays.
//!
//! A k-term phrase is folded into k-1 bigram hops. Each hop intersects the
//! current left-hand posting with the next term's posting, counts adjacent
//! positions per document with bitmap arithmetic, and carries forward a
//! residual posting that holds the positions where the right-hand term
//! ended a match so far. Documents whose count drops to zero on any hop
//! are masked out, so a later term can never rescue a broken prefix.
//!
//! Adjacency has two cases:
//!
//! - **in-bucket**: both positions fall into the same 16-position bucket
//!   and one AND of shifted bitmaps counts every pair at once;
//! - **cross-bucket**: the left position is the last bit of one bucket and
//!   the right position is the first bit of the next, found by a shifted
//!   intersection.

use std::borrow::Cow;
use std::mem;

use bit_vec::BitVec;
use log::debug;

use crate::codec;
use crate::codec::intersect::{intersect, intersect_rshift};
use crate::error::{KontosError, Result};

/// Posting arrays longer than this multiple of the rarest term's array are
/// pre-filtered down to the rarest term's documents.
const TRIM_FACTOR: usize = 10;

/// Count how many times the ordered phrase occurs with adjacent positions
/// in each document.
///
/// `postings[i]` is the packed posting array of the i-th phrase term (an
/// empty array for terms absent from the index), and `out[d]` receives the
/// phrase count of document `d`. Keys beyond `out.len()` are ignored.
///
/// Returns [`KontosError::InvalidQuery`] if fewer than two postings are
/// given; a missing term is not an error and simply yields zero counts.
pub fn compute_phrase_freqs(mut postings: Vec<Cow<'_, [u64]>>, out: &mut [u32]) -> Result<()> {
    if postings.len() < 2 {
        return Err(KontosError::invalid_query(
            "phrase must have at least two terms",
        ));
    }
    if postings.len() > 3 {
        trim_phrase_search(&mut postings);
    }

    out.fill(0);
    let mut mask = BitVec::from_elem(out.len(), true);
    let mut lhs = mem::replace(&mut postings[0], Cow::Borrowed(&[]));
    for rhs in &postings[1..] {
        // Only the last hop's counts survive; earlier hops just gate them.
        out.fill(0);
        let residual = bigram_freqs(&lhs, rhs, out)?;
        for (doc, &count) in out.iter().enumerate() {
            if count == 0 {
                mask.set(doc, false);
            }
        }
        lhs = Cow::Owned(residual);
    }
    for (doc, count) in out.iter_mut().enumerate() {
        if !mask[doc] {
            *count = 0;
        }
    }
    Ok(())
}

/// One bigram hop: count adjacent `(lhs, rhs)` positions into `freqs` and
/// return the residual posting for the next hop.
fn bigram_freqs(lhs: &[u64], rhs: &[u64], freqs: &mut [u32]) -> Result<Vec<u64>> {
    let inner = inner_bigram_freqs(lhs, rhs, freqs)?;
    let adjacent = adjacent_bigram_freqs(lhs, rhs, freqs)?;
    Ok(codec::merge_postings(&inner, &adjacent))
}

/// Adjacent pairs whose two positions fall into the same bucket.
fn inner_bigram_freqs(lhs: &[u64], rhs: &[u64], freqs: &mut [u32]) -> Result<Vec<u64>> {
    let (l, r) = intersect(lhs, rhs)?;
    if l == r {
        // Both sides are the same posting (a repeated-term bigram like
        // "dog dog"): count non-overlapping adjacent pairs per run.
        for &word in &l {
            let pairs = run_pairs(codec::lsb(word));
            if pairs > 0 {
                if let Some(count) = freqs.get_mut(codec::key(word) as usize) {
                    *count += pairs;
                }
            }
        }
        return Ok(r);
    }

    let mut residual = Vec::with_capacity(r.len());
    for (&lw, &rw) in l.iter().zip(&r) {
        // Bit p of the overlap is set when lhs holds p and rhs holds p+1.
        let overlap = codec::lsb(lw) & (codec::lsb(rw) >> 1);
        if overlap != 0 {
            if let Some(count) = freqs.get_mut(codec::key(lw) as usize) {
                *count += overlap.count_ones();
            }
        }
        // Carry the match-ending positions under rhs's (key, bucket).
        residual.push((rw & !codec::PAYLOAD_LSB_MASK) | ((overlap << 1) & codec::PAYLOAD_LSB_MASK));
    }
    Ok(residual)
}

/// Adjacent pairs that straddle a bucket boundary: the left position is
/// the top bit of one bucket and the right position is the bottom bit of
/// the bucket that follows it.
fn adjacent_bigram_freqs(lhs: &[u64], rhs: &[u64], freqs: &mut [u32]) -> Result<Vec<u64>> {
    let (l, r) = intersect_rshift(lhs, rhs, -1)?;
    let top_bit = 1u64 << (codec::PAYLOAD_LSB_BITS - 1);
    let mut residual = Vec::new();
    for (&lw, &rw) in l.iter().zip(&r) {
        if lw & top_bit != 0 && rw & 1 != 0 {
            if let Some(count) = freqs.get_mut(codec::key(lw) as usize) {
                *count += 1;
            }
            // The match ends at position 0 of rhs's bucket.
            residual.push((rw & !codec::PAYLOAD_LSB_MASK) | 1);
        }
    }
    Ok(residual)
}

/// Number of non-overlapping adjacent position pairs in one bucket bitmap:
/// each maximal run of n consecutive set bits yields n / 2 pairs.
fn run_pairs(mut bits: u64) -> u32 {
    let mut pairs = 0;
    while bits != 0 {
        let start = bits.trailing_zeros();
        let run = (bits >> start).trailing_ones();
        pairs += run / 2;
        bits &= !(((1u64 << run) - 1) << start);
    }
    pairs
}

/// Pre-filter long postings by the document set of the rarest term, so
/// later hops walk a domain close to the rarest posting's size.
fn trim_phrase_search(postings: &mut [Cow<'_, [u64]>]) {
    let Some(shortest_idx) = postings
        .iter()
        .enumerate()
        .min_by_key(|(_, posting)| posting.len())
        .map(|(idx, _)| idx)
    else {
        return;
    };
    let min_len = postings[shortest_idx].len();
    let shortest_keys = codec::keys_unique(&postings[shortest_idx]);

    for (idx, posting) in postings.iter_mut().enumerate() {
        if idx != shortest_idx && posting.len() > TRIM_FACTOR * min_len {
            debug!(
                "trimming posting {idx} from {} words to the rarest term's {} docs",
                posting.len(),
                shortest_keys.len()
            );
            *posting = Cow::Owned(codec::slice(posting, &shortest_keys));
        }
    }
}
