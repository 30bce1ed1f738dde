//! Concurrent retrieval of every sub-query and merging with a multi-match
//! bonus.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ragsearch_core::error::SearchError;
use ragsearch_core::types::ChunkId;

use crate::decompose::{DecomposedQuery, QueryDecomposer, SubQuery};

/// Bonus per additional distinct sub-query matching a candidate.
pub const MULTI_MATCH_BONUS: f64 = 0.1;
/// Bonus when a primary sub-query matched the candidate.
pub const PRIMARY_MATCH_BONUS: f64 = 0.05;

/// Ranked ids retrieved for one sub-query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubQueryHits {
    pub hits: Vec<(ChunkId, f64)>,
    /// Retrieval for this sub-query ran on a single backend.
    pub degraded: bool,
}

/// Retrieval callback run once per sub-query.
#[async_trait]
pub trait SubQueryRetriever: Send + Sync {
    async fn retrieve(&self, sub_query: &SubQuery, limit: usize) -> Result<SubQueryHits, SearchError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
    pub id: ChunkId,
    pub score: f64,
    /// Ids of the sub-queries that retrieved this candidate.
    pub matched_by: Vec<usize>,
    pub primary_matched: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiQueryOutcome {
    pub decomposition: DecomposedQuery,
    pub hits: Vec<MergedHit>,
    pub degraded: bool,
}

/// Merge per-sub-query hits: the best score seen for a candidate, plus
/// [`MULTI_MATCH_BONUS`] per additional distinct matching sub-query and
/// [`PRIMARY_MATCH_BONUS`] if any matching sub-query was primary. Sorted by
/// score, ties by id, truncated to `top_k`.
pub fn merge_sub_query_hits(results: &[(SubQuery, Vec<(ChunkId, f64)>)], top_k: usize) -> Vec<MergedHit> {
    struct Acc { best: f64, matched: BTreeSet<usize>, primary: bool }
    let mut acc: HashMap<&str, Acc> = HashMap::new();
    for (sub_query, hits) in results {
        for (id, score) in hits {
            let entry = acc.entry(id.as_str()).or_insert(Acc { best: *score, matched: BTreeSet::new(), primary: false });
            entry.best = entry.best.max(*score);
            entry.matched.insert(sub_query.id);
            entry.primary |= sub_query.is_primary;
        }
    }
    let mut merged: Vec<MergedHit> = acc.into_iter()
        .map(|(id, a)| {
            let extra = a.matched.len().saturating_sub(1) as f64 * MULTI_MATCH_BONUS;
            let primary = if a.primary { PRIMARY_MATCH_BONUS } else { 0.0 };
            MergedHit { id: id.to_string(), score: a.best + extra + primary, matched_by: a.matched.into_iter().collect(), primary_matched: a.primary }
        })
        .collect();
    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    merged.truncate(top_k);
    merged
}

pub struct MultiQuerySearchEngine {
    decomposer: Arc<QueryDecomposer>,
}

impl MultiQuerySearchEngine {
    pub fn new(decomposer: Arc<QueryDecomposer>) -> Self { Self { decomposer } }

    pub fn decomposer(&self) -> &QueryDecomposer { &self.decomposer }

    /// Decompose `query` (model-based when a generator is configured,
    /// rule-based otherwise), retrieve every sub-query concurrently and merge.
    ///
    /// Failed sub-queries are skipped and mark the outcome degraded; only
    /// when every sub-query fails is the first error returned.
    pub async fn search(&self, query: &str, retriever: &dyn SubQueryRetriever, per_query_limit: usize, top_k: usize) -> Result<MultiQueryOutcome, SearchError> {
        let decomposition = if self.decomposer.has_generator() {
            self.decomposer.decompose(query).await
        } else {
            self.decomposer.decompose_simple(query)
        };
        debug!(sub_queries = decomposition.sub_queries.len(), strategy = ?decomposition.strategy, "multi-query search");

        let outcomes = join_all(decomposition.sub_queries.iter().map(|sq| retriever.retrieve(sq, per_query_limit))).await;

        let mut degraded = false;
        let mut first_error = None;
        let mut results = Vec::with_capacity(outcomes.len());
        for (sub_query, outcome) in decomposition.sub_queries.iter().zip(outcomes) {
            match outcome {
                Ok(found) => {
                    degraded |= found.degraded;
                    results.push((sub_query.clone(), found.hits));
                }
                Err(e) => {
                    warn!(sub_query = sub_query.id, error = %e, "sub-query retrieval failed");
                    degraded = true;
                    first_error.get_or_insert(e);
                }
            }
        }
        if results.is_empty() {
            if let Some(e) = first_error { return Err(e); }
        }
        let hits = merge_sub_query_hits(&results, top_k);
        Ok(MultiQueryOutcome { decomposition, hits, degraded })
    }
}
