//! ragsearch-rank
//!
//! Pure ranking stages (rank fusion, conflict resolution) and the rerank
//! adapter with its local fallback scorer.

pub mod conflict;
pub mod fusion;
pub mod rerank;

pub use conflict::{ConflictKind, ConflictReport, ConflictResolver, Resolution};
pub use fusion::{rrf_fusion, sorted_by_score, weighted_fusion, FusionScoreMap, RankedList, DEFAULT_RRF_K};
pub use rerank::{rerank_with_fallback, HttpReranker, LexicalOverlapReranker, RerankOutcome};
