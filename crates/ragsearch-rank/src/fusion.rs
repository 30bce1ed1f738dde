//! Rank fusion: combine several ranked lists into one score map.
//!
//! Both functions are pure. The returned map has no order; use
//! [`sorted_by_score`] to obtain a deterministic ranking.

use std::collections::HashMap;

use ragsearch_core::types::{ChunkId, SearchHit};

pub const DEFAULT_RRF_K: u32 = 60;

/// Ordered `(id, score)` pairs, best first. Position is the rank.
pub type RankedList = Vec<(ChunkId, f64)>;

pub type FusionScoreMap = HashMap<ChunkId, f64>;

pub fn ranked_list(hits: &[SearchHit]) -> RankedList {
    hits.iter().map(|h| (h.id.clone(), h.score)).collect()
}

/// Reciprocal Rank Fusion: each item at 1-based rank `r` of each list adds
/// `1 / (k + r)` to its fused score.
pub fn rrf_fusion(rankings: &[RankedList], k: u32) -> FusionScoreMap {
    let mut scores = FusionScoreMap::new();
    for list in rankings {
        for (pos, (id, _)) in list.iter().enumerate() {
            let rank = pos as f64 + 1.0;
            *scores.entry(id.clone()).or_default() += 1.0 / (f64::from(k) + rank);
        }
    }
    scores
}

/// Scale scores into `[0, 1]`. A map whose values are all equal maps every
/// entry to `1.0`.
pub fn min_max_normalize(scores: &HashMap<ChunkId, f64>) -> HashMap<ChunkId, f64> {
    let Some(min) = scores.values().copied().reduce(f64::min) else { return HashMap::new() };
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    scores
        .iter()
        .map(|(id, s)| {
            let norm = if range > 0.0 { (s - min) / range } else { 1.0 };
            (id.clone(), norm)
        })
        .collect()
}

/// Weighted sum of independently min-max normalized score maps over the
/// union of their keys. Missing entries contribute `0`.
pub fn weighted_fusion(
    vector_scores: &HashMap<ChunkId, f64>,
    lexical_scores: &HashMap<ChunkId, f64>,
    vector_weight: f64,
    lexical_weight: f64,
) -> FusionScoreMap {
    let norm_v = min_max_normalize(vector_scores);
    let norm_l = min_max_normalize(lexical_scores);
    let mut out = FusionScoreMap::with_capacity(norm_v.len() + norm_l.len());
    for id in norm_v.keys().chain(norm_l.keys()) {
        if out.contains_key(id) { continue; }
        let v = norm_v.get(id).copied().unwrap_or(0.0);
        let l = norm_l.get(id).copied().unwrap_or(0.0);
        out.insert(id.clone(), vector_weight * v + lexical_weight * l);
    }
    out
}

/// Score descending, id ascending on ties.
pub fn sorted_by_score(scores: &FusionScoreMap) -> RankedList {
    let mut out: RankedList = scores.iter().map(|(id, s)| (id.clone(), *s)).collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}
