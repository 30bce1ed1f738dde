//! ragsearch-expand
//!
//! Query expansion ahead of retrieval: hypothetical-document generation
//! (HyDE) and query decomposition with multi-query merging. Both are quality
//! enhancements and fall back locally when the generation backend fails.

use std::time::Duration;

pub mod decompose;
pub mod generator;
pub mod hyde;
pub mod multi_query;

pub use decompose::{DecomposedQuery, DecompositionStrategy, QueryDecomposer, SubQuery};
pub use generator::{get_default_generator, HttpGenerator};
pub use hyde::{HydeEngine, HypotheticalDocument};
pub use multi_query::{merge_sub_query_hits, MergedHit, MultiQueryOutcome, MultiQuerySearchEngine, SubQueryHits, SubQueryRetriever};

/// Lifetime of entries in the expansion caches.
pub const EXPANSION_CACHE_TTL: Duration = Duration::from_secs(3600);
