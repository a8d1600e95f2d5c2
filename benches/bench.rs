//! Criterion benchmarks for the Kontos posting engine, covering:
//! - Index construction from per-document position lists
//! - Bigram and five-term phrase frequency queries

use std::collections::BTreeMap;
use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use kontos::index::builder::PostingsBuilder;
use kontos::index::{PostingIndex, TermId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const VOCAB: u64 = 1_000;
const DOCS: u32 = 10_000;
const DOC_LEN: u32 = 64;

/// Generate a synthetic index of `docs` documents with `DOC_LEN` term
/// occurrences each, drawn from a small vocabulary so phrases actually
/// match.
fn generate_index(docs: u32) -> PostingIndex {
    let mut rng = StdRng::seed_from_u64(42);
    let mut builder = PostingsBuilder::new();
    for doc_id in 0..docs {
        let mut by_term: BTreeMap<TermId, Vec<u32>> = BTreeMap::new();
        for posn in 0..DOC_LEN {
            let term_id = rng.random_range(0..VOCAB);
            by_term.entry(term_id).or_default().push(posn);
        }
        for (term_id, posns) in by_term {
            builder.add_posns(doc_id, term_id, posns);
        }
    }
    builder.build(false).unwrap()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.throughput(Throughput::Elements(u64::from(DOCS)));
    group.sample_size(10);
    group.bench_function("posting_builder_10k_docs", |b| {
        b.iter(|| generate_index(black_box(DOCS)));
    });
    group.finish();
}

fn bench_phrase(c: &mut Criterion) {
    let index = generate_index(DOCS);
    let terms: Vec<TermId> = (0..5).collect();
    let mut out = vec![0u32; index.max_doc_id() as usize + 1];

    let mut group = c.benchmark_group("phrase");
    group.throughput(Throughput::Elements(u64::from(DOCS)));
    group.bench_function("bigram_10k_docs", |b| {
        b.iter(|| {
            index
                .phrase_freqs(black_box(&terms[..2]), &mut out, None)
                .unwrap();
        });
    });
    group.bench_function("five_term_phrase_10k_docs", |b| {
        b.iter(|| {
            index
                .phrase_freqs(black_box(&terms), &mut out, None)
                .unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_phrase);
criterion_main!(benches);
