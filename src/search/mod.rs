//! Hybrid retrieval scoring (spec §4.5): sparse BM25, max-normalized
//! score fusion, and the reranker engine used by the dedicated reranker
//! service.

pub mod bm25;
pub mod rerank;

pub use bm25::{fuse, score_sparse, SparseCandidate};
pub use rerank::{RerankRunResult, RerankedRow, RerankerEngine};
