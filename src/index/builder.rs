//! Builders that turn raw `(term, document, position)` data into a
//! [`PostingIndex`].
//!
//! Two construction paths exist: [`build_from_triples`] consumes three
//! parallel columns already sorted by `(term, doc, position)` in one scan,
//! and [`PostingsBuilder`] accumulates per-document position lists in any
//! term order before encoding.

use ahash::AHashMap;
use log::debug;

use super::{DocId, PostingIndex, TermId};
use crate::codec;
use crate::error::{KontosError, Result};

/// Build an index from three parallel columns sorted by
/// `(term, doc, position)`.
///
/// Term boundaries are found with a scan over the term column; each
/// term's `(doc, position)` block is then packed with
/// [`codec::encode`]. Returns [`KontosError::InvalidInput`] if the
/// columns differ in length or are not sorted.
pub fn build_from_triples(
    term_ids: &[TermId],
    doc_ids: &[DocId],
    posns: &[u32],
) -> Result<PostingIndex> {
    if term_ids.len() != doc_ids.len() || doc_ids.len() != posns.len() {
        return Err(KontosError::invalid_input(format!(
            "triple columns differ in length: {} terms, {} docs, {} positions",
            term_ids.len(),
            doc_ids.len(),
            posns.len()
        )));
    }

    let mut postings: AHashMap<TermId, Vec<u64>> = AHashMap::new();
    let mut max_doc_id: DocId = 0;
    let mut start = 0;
    while start < term_ids.len() {
        let term_id = term_ids[start];
        let mut end = start + 1;
        while end < term_ids.len() && term_ids[end] == term_id {
            end += 1;
        }
        if end < term_ids.len() && term_ids[end] < term_id {
            return Err(KontosError::invalid_input(
                "term column is not sorted ascending",
            ));
        }

        let encoded = codec::encode(&doc_ids[start..end], &posns[start..end])?;
        if let Some(&block_max) = doc_ids[start..end].iter().max() {
            max_doc_id = max_doc_id.max(block_max);
        }
        postings.insert(term_id, encoded);
        start = end;
    }

    debug!(
        "encoded {} terms from {} triples",
        postings.len(),
        term_ids.len()
    );
    Ok(PostingIndex::new(postings, max_doc_id))
}

/// Accumulates per-document position lists and encodes them on
/// [`build`](PostingsBuilder::build).
///
/// Documents must be added in ascending id order with sorted position
/// lists; violations surface as [`KontosError::InvalidInput`] when the
/// index is built.
#[derive(Debug, Default)]
pub struct PostingsBuilder {
    term_posns: AHashMap<TermId, (Vec<DocId>, Vec<u32>)>,
    max_doc_id: DocId,
}

impl PostingsBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        PostingsBuilder::default()
    }

    /// Record the positions of one term in one document.
    pub fn add_posns(&mut self, doc_id: DocId, term_id: TermId, posns: Vec<u32>) {
        let (doc_column, posn_column) = self.term_posns.entry(term_id).or_default();
        doc_column.extend(std::iter::repeat_n(doc_id, posns.len()));
        posn_column.extend(posns);
        self.ensure_capacity(doc_id);
    }

    /// Raise the builder's document capacity to cover `doc_id`, for
    /// trailing documents that contain no terms.
    pub fn ensure_capacity(&mut self, doc_id: DocId) {
        self.max_doc_id = self.max_doc_id.max(doc_id);
    }

    /// Encode the accumulated postings into a [`PostingIndex`].
    ///
    /// With `check` set, every encoded array is decoded again and compared
    /// against the input; a mismatch is reported as
    /// [`KontosError::InvariantViolation`].
    pub fn build(self, check: bool) -> Result<PostingIndex> {
        let mut postings = AHashMap::with_capacity(self.term_posns.len());
        for (term_id, (doc_column, posn_column)) in &self.term_posns {
            let encoded = codec::encode(doc_column, posn_column)?;
            if check {
                verify_round_trip(*term_id, &encoded, doc_column, posn_column)?;
            }
            postings.insert(*term_id, encoded);
        }
        debug!("built posting index with {} terms", postings.len());
        Ok(PostingIndex::new(postings, self.max_doc_id))
    }
}

fn verify_round_trip(
    term_id: TermId,
    encoded: &[u64],
    doc_column: &[DocId],
    posn_column: &[u32],
) -> Result<()> {
    let mut doc_ids_again = Vec::with_capacity(doc_column.len());
    let mut posns_again = Vec::with_capacity(posn_column.len());
    for (doc_id, posns) in codec::decode(encoded) {
        for posn in posns {
            doc_ids_again.push(doc_id);
            posns_again.push(posn);
        }
    }
    if doc_ids_again != doc_column || posns_again != posn_column {
        return Err(KontosError::invariant(format!(
            "posting round-trip mismatch for term {term_id}"
        )));
    }
    Ok(())
}
