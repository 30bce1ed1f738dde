//! The request-scoped search algorithm.
//!
//! cache lookup -> expansion -> parallel retrieval -> fusion -> hydration ->
//! rerank -> conflict resolution -> response -> cache write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ragsearch_cache::{CacheStats, InvalidationReport, QueryCache};
use ragsearch_core::config::{FusionMethod, SearchSettings};
use ragsearch_core::error::{with_timeout, Result, SearchError};
use ragsearch_core::health::HealthMonitor;
use ragsearch_core::traits::{ChunkRepository, Embedder, LexicalStore, Reranker, SearchEngine, SimilarityStore};
use ragsearch_core::types::{unsupported_filter, ChunkId, ChunkRef, ExpansionMode, Filters, SearchCandidate, SearchHit, SearchRequest, SearchResponse, SearchResult, FILTERABLE_FIELDS};
use ragsearch_expand::{HydeEngine, MultiQuerySearchEngine, SubQuery, SubQueryHits, SubQueryRetriever};
use ragsearch_rank::fusion::ranked_list;
use ragsearch_rank::{rerank_with_fallback, rrf_fusion, sorted_by_score, weighted_fusion, ConflictResolver, LexicalOverlapReranker, RankedList};

use crate::builder::SearchOrchestratorBuilder;

/// Result of one retrieval backend for one query text.
enum Leg {
    Hits(Vec<SearchHit>),
    Failed(String),
    NotConfigured,
}

impl Leg {
    fn reason(&self) -> String {
        match self {
            Leg::Hits(_) => "ok".into(),
            Leg::Failed(reason) => reason.clone(),
            Leg::NotConfigured => "not configured".into(),
        }
    }
}

/// A fused ranking, best first, plus whether one backend was missing from it.
struct Fused {
    ranking: RankedList,
    degraded: bool,
}

/// A finished response and whether it may be cached.
struct Executed {
    response: SearchResponse,
    cacheable: bool,
}

pub struct SearchOrchestrator {
    pub(crate) settings: SearchSettings,
    pub(crate) embedder: Option<Arc<dyn Embedder>>,
    pub(crate) similarity: Option<Arc<dyn SimilarityStore>>,
    pub(crate) lexical: Option<Arc<dyn LexicalStore>>,
    pub(crate) chunks: Arc<dyn ChunkRepository>,
    pub(crate) reranker: Option<Arc<dyn Reranker>>,
    pub(crate) fallback_reranker: LexicalOverlapReranker,
    pub(crate) resolver: ConflictResolver,
    pub(crate) cache: Option<QueryCache<SearchResponse>>,
    pub(crate) hyde: Option<HydeEngine>,
    pub(crate) multi_query: MultiQuerySearchEngine,
    pub(crate) similarity_monitor: Option<HealthMonitor>,
    pub(crate) lexical_monitor: Option<HealthMonitor>,
}

impl SearchOrchestrator {
    pub fn builder() -> SearchOrchestratorBuilder { SearchOrchestratorBuilder::default() }

    pub fn settings(&self) -> &SearchSettings { &self.settings }

    pub fn cache_stats(&self) -> Option<CacheStats> { self.cache.as_ref().map(QueryCache::stats) }

    /// Drop every cached response of `tenant`, e.g. after re-ingestion.
    pub async fn invalidate_tenant(&self, tenant: &str) -> Option<InvalidationReport> {
        match &self.cache {
            Some(cache) => Some(cache.invalidate_tenant(tenant).await),
            None => None,
        }
    }

    pub async fn clear_caches(&self) {
        if let Some(cache) = &self.cache { cache.clear_all().await; }
        if let Some(hyde) = &self.hyde { hyde.clear_cache(); }
        self.multi_query.decomposer().clear_cache();
    }

    /// `(backend, available)` for each monitored backend.
    pub fn backend_status(&self) -> Vec<(String, bool)> {
        [&self.similarity_monitor, &self.lexical_monitor].into_iter().flatten()
            .map(|m| (m.name().to_string(), m.is_available()))
            .collect()
    }

    /// Stop the health monitors.
    pub async fn shutdown(self) {
        for monitor in [self.similarity_monitor, self.lexical_monitor].into_iter().flatten() {
            monitor.shutdown().await;
        }
    }

    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        let executed = self.execute(&req).await?;
        if executed.cacheable { self.store(&req, &executed.response).await; }
        Ok(executed.response)
    }

    /// Like [`search`](Self::search), abandoning in-flight work once `token`
    /// is cancelled. A cancelled request never writes to the cache.
    pub async fn search_cancellable(&self, req: SearchRequest, token: CancellationToken) -> Result<SearchResponse> {
        let executed = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SearchError::Cancelled),
            executed = self.execute(&req) => executed?,
        };
        if token.is_cancelled() { return Err(SearchError::Cancelled); }
        if executed.cacheable { self.store(&req, &executed.response).await; }
        Ok(executed.response)
    }

    fn validate(&self, req: &SearchRequest) -> Result<()> {
        if req.query.trim().is_empty() { return Err(SearchError::Validation("query must not be empty".into())); }
        if req.tenant_id.trim().is_empty() { return Err(SearchError::Validation("tenant_id must not be empty".into())); }
        if req.top_k == 0 || req.top_k > self.settings.max_top_k {
            return Err(SearchError::Validation(format!("top_k must be between 1 and {}", self.settings.max_top_k)));
        }
        if let Some(field) = unsupported_filter(&req.filters) {
            return Err(SearchError::Validation(format!("cannot filter on '{field}', allowed: {}", FILTERABLE_FIELDS.join(", "))));
        }
        Ok(())
    }

    fn cache_for(&self, req: &SearchRequest) -> Option<&QueryCache<SearchResponse>> {
        if req.use_cache && self.settings.cache_enabled { self.cache.as_ref() } else { None }
    }

    /// HyDE needs the similarity path; without it the request runs plain.
    fn effective_expansion(&self, req: &SearchRequest) -> ExpansionMode {
        match req.expansion() {
            ExpansionMode::Hyde if self.hyde.is_none() || self.similarity.is_none() => {
                debug!("hyde requested without a similarity path, running plain");
                ExpansionMode::None
            }
            mode => mode,
        }
    }

    async fn store(&self, req: &SearchRequest, response: &SearchResponse) {
        if let Some(cache) = self.cache_for(req) {
            let modifiers = cache_modifiers(req, response.expansion);
            cache.set(&req.query, &req.tenant_id, &modifiers, response, None).await;
        }
    }

    async fn execute(&self, req: &SearchRequest) -> Result<Executed> {
        let started = Instant::now();
        self.validate(req)?;
        let mode = self.effective_expansion(req);

        if let Some(cache) = self.cache_for(req) {
            if let Some(mut hit) = cache.get(&req.query, &req.tenant_id, &cache_modifiers(req, mode)).await {
                debug!(tenant = %req.tenant_id, "search served from cache");
                hit.cached = true;
                hit.time_ms = started.elapsed().as_millis() as u64;
                return Ok(Executed { response: hit, cacheable: false });
            }
        }

        let pool = req.top_k.saturating_mul(2);
        let mut sub_queries = Vec::new();
        let mut expansion_failed = false;
        let fused = match mode {
            ExpansionMode::None => self.retrieve_fused(&req.query, None, pool, &req.tenant_id, &req.filters).await?,
            ExpansionMode::Hyde => {
                let vector = match &self.hyde {
                    Some(hyde) => match hyde.expand(&req.query).await {
                        Ok(doc) => {
                            debug!(fallback = doc.fallback, "hyde expansion ready");
                            Some(doc.embedding)
                        }
                        Err(e) => {
                            warn!(error = %e, "hyde embedding failed, embedding the raw query");
                            expansion_failed = true;
                            None
                        }
                    },
                    None => None,
                };
                self.retrieve_fused(&req.query, vector, pool, &req.tenant_id, &req.filters).await?
            }
            ExpansionMode::Decomposition => {
                let retriever = SubQueryLeg { orchestrator: self, tenant: &req.tenant_id, filters: &req.filters };
                let outcome = self.multi_query.search(&req.query, &retriever, pool, pool).await?;
                sub_queries = outcome.decomposition.sub_queries.iter().map(|s| s.query.clone()).collect();
                Fused { ranking: outcome.hits.into_iter().map(|h| (h.id, h.score)).collect(), degraded: outcome.degraded }
            }
        };
        let mut degraded = fused.degraded || expansion_failed;

        let (candidates, hydration_failed) = self.hydrate(&req.tenant_id, &fused.ranking, pool).await;
        degraded |= hydration_failed;

        let reranked = rerank_with_fallback(
            self.reranker.as_deref(),
            &self.fallback_reranker,
            &req.query,
            candidates,
            self.settings.rerank_top_n,
            self.settings.backend_timeout(),
        ).await;

        let resolution = self.resolver.resolve(&reranked.candidates);
        let mut winners = resolution.winners;
        winners.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        winners.truncate(req.top_k);

        let results: Vec<SearchResult> = winners.into_iter().map(SearchResult::from).collect();
        let response = SearchResponse {
            query: req.query.clone(),
            total: results.len(),
            results,
            time_ms: started.elapsed().as_millis() as u64,
            cached: false,
            hyde_used: mode == ExpansionMode::Hyde,
            decomposition_used: mode == ExpansionMode::Decomposition,
            degraded,
            expansion: mode,
            conflicts: resolution.conflicts.len(),
            sub_queries,
        };
        info!(
            tenant = %req.tenant_id,
            results = response.total,
            conflicts = response.conflicts,
            degraded,
            rerank_fallback = reranked.fallback_used,
            elapsed_ms = response.time_ms,
            "search complete"
        );
        Ok(Executed { response, cacheable: !degraded })
    }

    async fn vector_leg(&self, text: &str, vector: Option<Vec<f32>>, limit: usize, tenant: &str, filters: &Filters) -> Leg {
        let (Some(store), Some(embedder)) = (&self.similarity, &self.embedder) else { return Leg::NotConfigured };
        if self.similarity_monitor.as_ref().is_some_and(|m| !m.is_available()) {
            return Leg::Failed("marked unavailable by health monitor".into());
        }
        let timeout = self.settings.backend_timeout();
        let vector = match vector {
            Some(v) => v,
            None => match with_timeout(timeout, embedder.embed(text)).await {
                Ok(v) => v,
                Err(e) => return Leg::Failed(format!("embedding failed: {e}")),
            },
        };
        match with_timeout(timeout, store.search(&vector, limit, tenant, filters)).await {
            Ok(hits) => Leg::Hits(hits),
            Err(e) => Leg::Failed(e.to_string()),
        }
    }

    async fn lexical_leg(&self, text: &str, limit: usize, tenant: &str, filters: &Filters) -> Leg {
        let Some(store) = &self.lexical else { return Leg::NotConfigured };
        if self.lexical_monitor.as_ref().is_some_and(|m| !m.is_available()) {
            return Leg::Failed("marked unavailable by health monitor".into());
        }
        match with_timeout(self.settings.backend_timeout(), store.bm25_search(text, limit, tenant, filters)).await {
            Ok(hits) => Leg::Hits(hits),
            Err(e) => Leg::Failed(e.to_string()),
        }
    }

    /// Both backends concurrently, fused. One failing backend degrades the
    /// ranking to the other; both failing is an error.
    async fn retrieve_fused(&self, text: &str, vector: Option<Vec<f32>>, limit: usize, tenant: &str, filters: &Filters) -> Result<Fused> {
        let (v, l) = tokio::join!(
            self.vector_leg(text, vector, limit, tenant, filters),
            self.lexical_leg(text, limit, tenant, filters),
        );
        let degraded = matches!(v, Leg::Failed(_)) || matches!(l, Leg::Failed(_));
        let (vector_hits, lexical_hits) = match (v, l) {
            (Leg::Hits(v), Leg::Hits(l)) => (Some(v), Some(l)),
            (Leg::Hits(v), other) => {
                if let Leg::Failed(reason) = &other { warn!(tenant = %tenant, backend = "lexical", error = %reason, "retrieval degraded to similarity only"); }
                (Some(v), None)
            }
            (other, Leg::Hits(l)) => {
                if let Leg::Failed(reason) = &other { warn!(tenant = %tenant, backend = "similarity", error = %reason, "retrieval degraded to lexical only"); }
                (None, Some(l))
            }
            (v, l) => return Err(SearchError::RetrievalUnavailable { vector: v.reason(), lexical: l.reason() }),
        };
        debug!(
            vector = vector_hits.as_ref().map_or(0, Vec::len),
            lexical = lexical_hits.as_ref().map_or(0, Vec::len),
            "retrieved"
        );
        Ok(Fused { ranking: self.fuse(vector_hits.as_deref(), lexical_hits.as_deref()), degraded })
    }

    fn fuse(&self, vector: Option<&[SearchHit]>, lexical: Option<&[SearchHit]>) -> RankedList {
        let scores = match self.settings.fusion {
            FusionMethod::Rrf => {
                let rankings: Vec<RankedList> = [vector, lexical].into_iter().flatten().map(ranked_list).collect();
                rrf_fusion(&rankings, self.settings.rrf_k)
            }
            FusionMethod::Weighted => {
                let to_map = |hits: Option<&[SearchHit]>| -> HashMap<ChunkId, f64> {
                    hits.unwrap_or_default().iter().map(|h| (h.id.clone(), h.score)).collect()
                };
                weighted_fusion(&to_map(vector), &to_map(lexical), self.settings.vector_weight, self.settings.lexical_weight)
            }
        };
        sorted_by_score(&scores)
    }

    /// Full content for the best `limit` fused ids, in fused order. Ids the
    /// repository does not return are dropped; a repository failure drops
    /// everything and reports `true`.
    async fn hydrate(&self, tenant: &str, ranking: &RankedList, limit: usize) -> (Vec<SearchCandidate>, bool) {
        let head: Vec<(ChunkRef, f64)> = ranking.iter().take(limit)
            .filter_map(|(id, score)| match ChunkRef::parse(id) {
                Some(r) => Some((r, *score)),
                None => { warn!(id = %id, "dropping candidate with malformed id"); None }
            })
            .collect();
        if head.is_empty() { return (Vec::new(), false); }
        let refs: Vec<ChunkRef> = head.iter().map(|(r, _)| r.clone()).collect();
        let chunks = match with_timeout(self.settings.backend_timeout(), self.chunks.get_chunks_by_ids(tenant, &refs)).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "chunk hydration failed");
                return (Vec::new(), true);
            }
        };
        let mut by_id: HashMap<ChunkId, _> = chunks.into_iter()
            .filter(|c| c.tenant_id == tenant)
            .map(|c| (c.id(), c))
            .collect();
        let candidates: Vec<SearchCandidate> = head.into_iter()
            .filter_map(|(r, score)| by_id.remove(&r.id()).map(|c| SearchCandidate::from_chunk(c, score)))
            .collect();
        if candidates.len() < refs.len() { debug!(requested = refs.len(), found = candidates.len(), "some candidates could not be hydrated"); }
        (candidates, false)
    }
}

/// Everything besides query and tenant that shapes a response.
fn cache_modifiers(req: &SearchRequest, mode: ExpansionMode) -> Vec<String> {
    let mut mods = vec![format!("top_k={}", req.top_k)];
    match mode {
        ExpansionMode::Hyde => mods.push("hyde".into()),
        ExpansionMode::Decomposition => mods.push("decomp".into()),
        ExpansionMode::None => {}
    }
    mods.extend(req.filters.iter().map(|(k, v)| format!("filter:{k}={v}")));
    mods
}

/// Retrieval for one decomposed sub-query, scoped to the request's tenant.
struct SubQueryLeg<'a> {
    orchestrator: &'a SearchOrchestrator,
    tenant: &'a str,
    filters: &'a Filters,
}

#[async_trait]
impl<'a> SubQueryRetriever for SubQueryLeg<'a> {
    async fn retrieve(&self, sub_query: &SubQuery, limit: usize) -> Result<SubQueryHits> {
        let fused = self.orchestrator.retrieve_fused(&sub_query.query, None, limit, self.tenant, self.filters).await?;
        Ok(SubQueryHits { hits: fused.ranking, degraded: fused.degraded })
    }
}

#[async_trait]
impl SearchEngine for SearchOrchestrator {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        SearchOrchestrator::search(self, request).await
    }
}
