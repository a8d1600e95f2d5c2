//! Positional posting index.
//!
//! A [`PostingIndex`] maps term ids to packed posting arrays (see
//! [`crate::codec`]) and answers document-frequency, term-frequency,
//! position, and phrase-frequency queries over them. The index is
//! immutable with respect to queries; the mutating operations
//! ([`concat`](PostingIndex::concat), [`merge`](PostingIndex::merge),
//! [`insert`](PostingIndex::insert)) must not run concurrently with
//! readers. A read-only index can be shared across threads: the frequency
//! caches sit behind their own locks, so every query takes `&self`.

pub mod builder;

use std::borrow::Cow;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{KontosError, Result};
use crate::phrase;

/// Term identifier.
pub type TermId = u64;
/// Document identifier.
pub type DocId = u32;

/// Posting arrays longer than this are eligible for cache warming.
const WARM_THRESHOLD: usize = 255;
/// Frequency caching only kicks in for indexes with at least this many
/// documents.
const CACHE_MIN_DOCS: DocId = 100_000;

/// An inverted index of packed positional postings.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostingIndex {
    /// Per-term packed posting arrays, strictly ascending as `u64`.
    postings: AHashMap<TermId, Vec<u64>>,
    /// The highest document id seen by the builders.
    max_doc_id: DocId,
    #[serde(skip)]
    docfreq_cache: RwLock<AHashMap<TermId, u32>>,
    #[serde(skip)]
    termfreq_cache: RwLock<AHashMap<TermId, (Vec<DocId>, Vec<u32>)>>,
}

impl PostingIndex {
    pub(crate) fn new(postings: AHashMap<TermId, Vec<u64>>, max_doc_id: DocId) -> Self {
        PostingIndex {
            postings,
            max_doc_id,
            docfreq_cache: RwLock::default(),
            termfreq_cache: RwLock::default(),
        }
    }

    /// Create an index from already-encoded posting arrays.
    ///
    /// Every array must be strictly ascending and must not reference a
    /// document beyond `max_doc_id`.
    pub fn from_encoded(postings: AHashMap<TermId, Vec<u64>>, max_doc_id: DocId) -> Result<Self> {
        for (term_id, words) in &postings {
            if !words.windows(2).all(|pair| pair[0] < pair[1]) {
                return Err(KontosError::invalid_input(format!(
                    "posting array for term {term_id} is not strictly ascending"
                )));
            }
            if let Some(&last) = words.last() {
                if codec::key(last) > max_doc_id {
                    return Err(KontosError::invalid_input(format!(
                        "posting array for term {term_id} references doc {} beyond max doc id {max_doc_id}",
                        codec::key(last)
                    )));
                }
            }
        }
        Ok(PostingIndex::new(postings, max_doc_id))
    }

    /// The highest document id in the index.
    pub fn max_doc_id(&self) -> DocId {
        self.max_doc_id
    }

    /// Number of distinct terms in the index.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Iterate over the term ids in the index, in no particular order.
    pub fn terms(&self) -> impl Iterator<Item = TermId> + '_ {
        self.postings.keys().copied()
    }

    /// The packed posting array of a term, if the term is present.
    pub fn encoded_postings(&self, term_id: TermId) -> Option<&[u64]> {
        self.postings.get(&term_id).map(Vec::as_slice)
    }

    /// Decoded positions of a term in each requested document, in request
    /// order. Documents that do not contain the term yield empty arrays.
    pub fn positions(&self, term_id: TermId, doc_ids: &[DocId]) -> Vec<Vec<u32>> {
        let Some(encoded) = self.postings.get(&term_id) else {
            return vec![Vec::new(); doc_ids.len()];
        };
        let wanted = sorted_unique_docs(doc_ids);
        let decoded: AHashMap<DocId, Vec<u32>> = codec::decode(&codec::slice(encoded, &wanted))
            .into_iter()
            .collect();
        doc_ids
            .iter()
            .map(|doc_id| decoded.get(doc_id).cloned().unwrap_or_default())
            .collect()
    }

    /// Per-document term frequencies, counting unique positions.
    ///
    /// Returns the documents containing the term together with the counts,
    /// both ordered by document id. When `doc_ids` is given, only those
    /// documents are considered (and the cache is bypassed).
    pub fn termfreqs(&self, term_id: TermId, doc_ids: Option<&[DocId]>) -> (Vec<DocId>, Vec<u32>) {
        let Some(encoded) = self.postings.get(&term_id) else {
            return (Vec::new(), Vec::new());
        };
        match doc_ids {
            Some(doc_ids) => {
                let wanted = sorted_unique_docs(doc_ids);
                computed_termfreqs(&codec::slice(encoded, &wanted))
            }
            None => {
                if let Some(hit) = self.termfreq_cache.read().get(&term_id) {
                    return hit.clone();
                }
                let freqs = computed_termfreqs(encoded);
                // Only terms that already earned a docfreq cache slot get
                // a termfreq slot.
                if self.docfreq_cache.read().contains_key(&term_id) {
                    self.termfreq_cache.write().insert(term_id, freqs.clone());
                }
                freqs
            }
        }
    }

    /// Number of distinct documents containing the term.
    pub fn docfreq(&self, term_id: TermId) -> u32 {
        if let Some(&docfreq) = self.docfreq_cache.read().get(&term_id) {
            return docfreq;
        }
        let Some(encoded) = self.postings.get(&term_id) else {
            return 0;
        };
        let docfreq = codec::keys_unique(encoded).len() as u32;
        if self.should_cache_docfreq(docfreq) {
            self.docfreq_cache.write().insert(term_id, docfreq);
        }
        docfreq
    }

    /// Count how many times the ordered phrase `term_ids` occurs with
    /// adjacent positions in each document.
    ///
    /// `out` must hold one slot per document (`max_doc_id + 1`); slot `d`
    /// receives the phrase count of document `d`. When `doc_ids` is given,
    /// every term posting is first restricted to those documents. Terms
    /// absent from the index yield zero counts; fewer than two terms is
    /// [`KontosError::InvalidQuery`].
    pub fn phrase_freqs(
        &self,
        term_ids: &[TermId],
        out: &mut [u32],
        doc_ids: Option<&[DocId]>,
    ) -> Result<()> {
        if out.len() != self.max_doc_id as usize + 1 {
            return Err(KontosError::invalid_input(format!(
                "output buffer covers {} documents but the index holds {}",
                out.len(),
                self.max_doc_id as usize + 1
            )));
        }
        let wanted = doc_ids.map(sorted_unique_docs);
        let postings: Vec<Cow<'_, [u64]>> = term_ids
            .iter()
            .map(|term_id| {
                let encoded = self
                    .postings
                    .get(term_id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                match &wanted {
                    Some(wanted) => Cow::Owned(codec::slice(encoded, wanted)),
                    None => Cow::Borrowed(encoded),
                }
            })
            .collect();
        phrase::compute_phrase_freqs(postings, out)
    }

    /// Bulk-append documents whose ids start at `doc_id_offset`.
    ///
    /// `rows[i]` holds the per-term sorted position lists of document
    /// `doc_id_offset + i`. The new ids must be disjoint from the ids
    /// already in the index.
    pub fn insert(&mut self, doc_id_offset: DocId, rows: &[Vec<(TermId, Vec<u32>)>]) -> Result<()> {
        let mut fresh = builder::PostingsBuilder::new();
        for (i, row) in rows.iter().enumerate() {
            let doc_id = doc_id_offset + i as DocId;
            fresh.ensure_capacity(doc_id);
            for (term_id, posns) in row {
                fresh.add_posns(doc_id, *term_id, posns.clone());
            }
        }
        self.merge(fresh.build(false)?);
        Ok(())
    }

    /// Append another index whose document ids are disjoint from this
    /// one's. Shared terms concatenate their arrays and re-sort.
    pub fn concat(&mut self, other: PostingIndex) {
        for (term_id, words) in other.postings {
            match self.postings.entry(term_id) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let existing = entry.get_mut();
                    existing.extend(words);
                    existing.sort_unstable();
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(words);
                }
            }
        }
        self.max_doc_id = self.max_doc_id.max(other.max_doc_id);
        self.clear_cache();
    }

    /// Set-union another index into this one, term by term.
    pub fn merge(&mut self, other: PostingIndex) {
        for (term_id, words) in other.postings {
            match self.postings.entry(term_id) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    let merged = codec::merge_postings(entry.get(), &words);
                    *entry.get_mut() = merged;
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(words);
                }
            }
        }
        self.max_doc_id = self.max_doc_id.max(other.max_doc_id);
        self.clear_cache();
    }

    /// A new index restricted to the given documents.
    pub fn slice(&self, doc_ids: &[DocId]) -> PostingIndex {
        let wanted = sorted_unique_docs(doc_ids);
        let postings = self
            .postings
            .iter()
            .map(|(term_id, words)| (*term_id, codec::slice(words, &wanted)))
            .collect();
        PostingIndex::new(postings, wanted.last().copied().unwrap_or(0))
    }

    /// Precompute the frequency caches for terms with long posting arrays.
    pub fn warm(&self) {
        let hot: Vec<(TermId, &Vec<u64>)> = self
            .postings
            .iter()
            .filter(|(_, words)| words.len() > WARM_THRESHOLD)
            .map(|(term_id, words)| (*term_id, words))
            .collect();
        if hot.is_empty() {
            return;
        }
        debug!("warming frequency caches for {} hot terms", hot.len());
        let stats: Vec<(TermId, u32, (Vec<DocId>, Vec<u32>))> = hot
            .par_iter()
            .map(|(term_id, words)| {
                let docfreq = codec::keys_unique(words).len() as u32;
                (*term_id, docfreq, computed_termfreqs(words))
            })
            .collect();

        let mut docfreqs = self.docfreq_cache.write();
        let mut termfreqs = self.termfreq_cache.write();
        for (term_id, docfreq, freqs) in stats {
            if self.should_cache_docfreq(docfreq) {
                docfreqs.insert(term_id, docfreq);
                termfreqs.insert(term_id, freqs);
            }
        }
    }

    /// Drop both frequency caches.
    pub fn clear_cache(&self) {
        self.docfreq_cache.write().clear();
        self.termfreq_cache.write().clear();
    }

    /// Approximate heap usage of the postings and caches, in bytes.
    pub fn nbytes(&self) -> usize {
        let postings: usize = self
            .postings
            .values()
            .map(|words| words.len() * size_of::<u64>())
            .sum();
        let docfreqs = self.docfreq_cache.read().len() * (size_of::<TermId>() + size_of::<u32>());
        let termfreqs: usize = self
            .termfreq_cache
            .read()
            .values()
            .map(|(doc_ids, counts)| {
                doc_ids.len() * size_of::<DocId>() + counts.len() * size_of::<u32>()
            })
            .sum();
        postings + docfreqs + termfreqs
    }

    fn should_cache_docfreq(&self, docfreq: u32) -> bool {
        self.max_doc_id >= CACHE_MIN_DOCS && docfreq > self.max_doc_id / 100
    }
}

impl Default for PostingIndex {
    fn default() -> Self {
        PostingIndex::new(AHashMap::new(), 0)
    }
}

impl Clone for PostingIndex {
    /// Deep-copies the postings; the clone starts with cold caches.
    fn clone(&self) -> Self {
        PostingIndex::new(self.postings.clone(), self.max_doc_id)
    }
}

impl PartialEq for PostingIndex {
    /// Compares postings and `max_doc_id`; cache contents are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.max_doc_id == other.max_doc_id && *self.postings == *other.postings
    }
}

/// Sum the bitmap population per document of an encoded array.
fn computed_termfreqs(words: &[u64]) -> (Vec<DocId>, Vec<u32>) {
    let mut doc_ids: Vec<DocId> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();
    for &word in words {
        let doc_id = codec::key(word);
        let bits = (word & codec::PAYLOAD_LSB_MASK).count_ones();
        if doc_ids.last() == Some(&doc_id) {
            if let Some(last) = counts.last_mut() {
                *last += bits;
            }
        } else {
            doc_ids.push(doc_id);
            counts.push(bits);
        }
    }
    (doc_ids, counts)
}

fn sorted_unique_docs(doc_ids: &[DocId]) -> Vec<DocId> {
    let mut wanted = doc_ids.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    wanted
}

#[cfg(test)]
mod tests {
    use super::builder::PostingsBuilder;
    use super::*;

    const A: TermId = 1;
    const B: TermId = 2;

    fn small_index() -> PostingIndex {
        let mut builder = PostingsBuilder::new();
        builder.add_posns(0, A, vec![5, 10]);
        builder.add_posns(0, B, vec![6, 11]);
        builder.add_posns(2, A, vec![0, 1, 17]);
        builder.build(true).unwrap()
    }

    #[test]
    fn test_positions_in_request_order() {
        let index = small_index();
        assert_eq!(
            index.positions(A, &[2, 1, 0]),
            vec![vec![0, 1, 17], vec![], vec![5, 10]]
        );
        assert_eq!(index.positions(99, &[0, 1]), vec![Vec::<u32>::new(); 2]);
    }

    #[test]
    fn test_termfreqs_count_unique_positions() {
        let index = small_index();
        assert_eq!(index.termfreqs(A, None), (vec![0, 2], vec![2, 3]));
        assert_eq!(index.termfreqs(A, Some(&[2])), (vec![2], vec![3]));
        assert_eq!(index.termfreqs(A, Some(&[1])), (vec![], vec![]));
        assert_eq!(index.termfreqs(99, None), (vec![], vec![]));
    }

    #[test]
    fn test_docfreq_counts_distinct_docs() {
        let index = small_index();
        assert_eq!(index.docfreq(A), 2);
        assert_eq!(index.docfreq(B), 1);
        assert_eq!(index.docfreq(99), 0);
        // Too small for the popularity threshold.
        assert!(index.docfreq_cache.read().is_empty());
    }

    #[test]
    fn test_phrase_freqs_requires_full_buffer() {
        let index = small_index();
        let mut short = vec![0; 2];
        assert!(index.phrase_freqs(&[A, B], &mut short, None).is_err());

        let mut out = vec![0; 3];
        index.phrase_freqs(&[A, B], &mut out, None).unwrap();
        assert_eq!(out, vec![2, 0, 0]);
    }

    #[test]
    fn test_phrase_freqs_with_doc_filter() {
        let index = small_index();
        let mut out = vec![0; 3];
        index.phrase_freqs(&[A, B], &mut out, Some(&[2])).unwrap();
        assert_eq!(out, vec![0, 0, 0]);
        index.phrase_freqs(&[A, B], &mut out, Some(&[0])).unwrap();
        assert_eq!(out, vec![2, 0, 0]);
    }

    #[test]
    fn test_slice_restricts_documents() {
        let index = small_index();
        let sliced = index.slice(&[2]);
        assert_eq!(sliced.max_doc_id(), 2);
        assert_eq!(sliced.positions(A, &[2]), vec![vec![0, 1, 17]]);
        assert_eq!(sliced.docfreq(B), 0);
    }

    #[test]
    fn test_concat_disjoint_ranges() {
        let mut index = small_index();
        let mut builder = PostingsBuilder::new();
        builder.add_posns(3, A, vec![4]);
        index.concat(builder.build(false).unwrap());
        assert_eq!(index.max_doc_id(), 3);
        assert_eq!(index.docfreq(A), 3);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let index = small_index();
        let mut merged = index.clone();
        merged.merge(index.clone());
        assert_eq!(merged, index);
    }

    #[test]
    fn test_insert_appends_new_docs() {
        let mut index = small_index();
        index
            .insert(3, &[vec![(A, vec![1]), (B, vec![2])]])
            .unwrap();
        assert_eq!(index.max_doc_id(), 3);
        let mut out = vec![0; 4];
        index.phrase_freqs(&[A, B], &mut out, None).unwrap();
        assert_eq!(out, vec![2, 0, 0, 1]);
    }

    #[test]
    fn test_mutation_clears_caches() {
        let index = small_index();
        index
            .termfreq_cache
            .write()
            .insert(A, (vec![0], vec![1]));
        index.docfreq_cache.write().insert(A, 1);
        let mut index = index;
        index.concat(PostingIndex::default());
        assert!(index.docfreq_cache.read().is_empty());
        assert!(index.termfreq_cache.read().is_empty());
    }

    #[test]
    fn test_warm_respects_popularity_policy() {
        // Long posting array but a small index: nothing qualifies.
        let mut builder = PostingsBuilder::new();
        for doc_id in 0..300 {
            builder.add_posns(doc_id, A, vec![0]);
        }
        let index = builder.build(false).unwrap();
        index.warm();
        assert!(index.docfreq_cache.read().is_empty());

        // A large index with a popular term qualifies: 2000 docs out of
        // 199_901 clears the max_doc_id / 100 bar.
        let mut builder = PostingsBuilder::new();
        for doc_id in 0..2_000u32 {
            builder.add_posns(doc_id * 100, A, vec![0]);
        }
        let index = builder.build(false).unwrap();
        index.warm();
        assert_eq!(index.docfreq_cache.read().get(&A), Some(&2_000));
        assert!(index.termfreq_cache.read().contains_key(&A));
    }

    #[test]
    fn test_from_encoded_validates() {
        let words = crate::codec::encode(&[0, 1], &[3, 4]).unwrap();
        let mut postings = AHashMap::new();
        postings.insert(A, words.clone());
        assert!(PostingIndex::from_encoded(postings.clone(), 1).is_ok());
        assert!(PostingIndex::from_encoded(postings, 0).is_err());

        let mut unsorted = AHashMap::new();
        unsorted.insert(A, vec![words[1], words[0]]);
        assert!(PostingIndex::from_encoded(unsorted, 1).is_err());
    }

    #[test]
    fn test_nbytes_accounts_postings() {
        let index = small_index();
        assert!(index.nbytes() > 0);
    }
}
