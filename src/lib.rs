//! # Kontos
//!
//! A compact positional posting-list library for fast phrase search in Rust.
//!
//! ## Features
//!
//! - Packed 64-bit posting encoding: document id, position bucket, and an
//!   in-bucket position bitmap in a single integer
//! - Phrase frequencies computed with bitwise intersections, without
//!   per-document loops
//! - Streaming k-gram evaluation that folds a phrase into bigram hops with
//!   a residual carry
//! - Rarest-term trimming to bound the cost of long phrases
//! - Cached document and term frequencies for hot terms

pub mod codec;
pub mod error;
pub mod index;
pub mod phrase;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
