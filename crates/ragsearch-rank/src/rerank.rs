//! Second-pass scoring of the fused shortlist.
//!
//! The external cross-encoder is optional. When it is absent the local
//! term-overlap scorer takes its place; when it fails, the same scorer is
//! substituted for that request only.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ragsearch_core::error::with_timeout;
use ragsearch_core::traits::{BackendResult, RerankItem, RerankScore, Reranker};
use ragsearch_core::types::SearchCandidate;
use ragsearch_core::BackendError;

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

/// Scores each item by the fraction of distinct query terms it contains.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOverlapReranker;

impl LexicalOverlapReranker {
    pub fn score(query: &str, text: &str) -> f64 {
        let query_terms: HashSet<String> = terms(query).collect();
        if query_terms.is_empty() { return 0.0; }
        let text_terms: HashSet<String> = terms(text).collect();
        let matched = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
        matched as f64 / query_terms.len() as f64
    }
}

#[async_trait]
impl Reranker for LexicalOverlapReranker {
    async fn rerank(&self, query: &str, items: &[RerankItem]) -> BackendResult<Vec<RerankScore>> {
        let mut scored: Vec<RerankScore> = items.iter()
            .map(|item| RerankScore { id: item.id.clone(), score: Self::score(query, &item.text) })
            .collect();
        // stable: equal overlap keeps the incoming (fused) order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> { query: &'a str, documents: &'a [RerankItem] }

#[derive(Deserialize)]
struct RerankResponse { results: Vec<RerankScore> }

/// Client for a cross-encoder service exposing `POST {base}/rerank`.
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, items: &[RerankItem]) -> BackendResult<Vec<RerankScore>> {
        if items.is_empty() { return Ok(Vec::new()); }
        let url = format!("{}/rerank", self.base_url);
        let resp = self.client.post(&url).json(&RerankRequest { query, documents: items }).send().await.map_err(BackendError::unavailable)?;
        if !resp.status().is_success() {
            return Err(BackendError::Unavailable(format!("reranker returned {}", resp.status())));
        }
        let body: RerankResponse = resp.json().await.map_err(BackendError::malformed)?;
        let known: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        if let Some(stray) = body.results.iter().find(|r| !known.contains(r.id.as_str())) {
            return Err(BackendError::Malformed(format!("reranker returned unknown id '{}'", stray.id)));
        }
        Ok(body.results)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    /// Reranked head (best first) followed by the untouched tail.
    pub candidates: Vec<SearchCandidate>,
    /// The primary reranker failed and the local scorer was substituted.
    pub fallback_used: bool,
}

/// Rerank the first `top_n` candidates. Candidates beyond `top_n`, and head
/// candidates the reranker did not score, keep their fused score.
pub async fn rerank_with_fallback(
    primary: Option<&dyn Reranker>,
    fallback: &dyn Reranker,
    query: &str,
    mut candidates: Vec<SearchCandidate>,
    top_n: usize,
    timeout: Duration,
) -> RerankOutcome {
    let split = top_n.min(candidates.len());
    if split == 0 { return RerankOutcome { candidates, fallback_used: false }; }
    let tail = candidates.split_off(split);
    let mut head = candidates;
    let items: Vec<RerankItem> = head.iter().map(|c| RerankItem { id: c.id.clone(), text: c.text.clone(), score: c.score }).collect();

    let mut fallback_used = false;
    let scores = match primary {
        Some(reranker) => match with_timeout(timeout, reranker.rerank(query, &items)).await {
            Ok(scores) => Ok(scores),
            Err(e) => {
                warn!(error = %e, "reranker failed, using lexical overlap fallback");
                fallback_used = true;
                fallback.rerank(query, &items).await
            }
        },
        None => fallback.rerank(query, &items).await,
    };

    match scores {
        Ok(scores) => {
            let by_id: HashMap<String, f64> = scores.into_iter().map(|s| (s.id, s.score)).collect();
            for c in &mut head {
                if let Some(s) = by_id.get(&c.id) { c.score = *s; }
            }
            head.sort_by(|a, b| b.score.total_cmp(&a.score));
            debug!(reranked = head.len(), kept = tail.len(), fallback_used, "rerank complete");
        }
        Err(e) => {
            warn!(error = %e, "fallback scorer failed, keeping fused order");
            fallback_used = true;
        }
    }
    head.extend(tail);
    RerankOutcome { candidates: head, fallback_used }
}
