use std::sync::Arc;

use ragsearch_cache::QueryCache;
use ragsearch_core::config::Settings;
use ragsearch_core::error::{Result, SearchError};
use ragsearch_core::health::HealthMonitor;
use ragsearch_core::traits::{CacheStore, ChunkRepository, Embedder, Generator, LexicalStore, Reranker, SimilarityStore};
use ragsearch_expand::{HydeEngine, MultiQuerySearchEngine, QueryDecomposer};
use ragsearch_rank::{ConflictResolver, LexicalOverlapReranker};

use crate::orchestrator::SearchOrchestrator;

/// Collects the collaborators of a [`SearchOrchestrator`]. Only the chunk
/// repository and one retrieval backend are required.
#[derive(Default)]
pub struct SearchOrchestratorBuilder {
    settings: Settings,
    embedder: Option<Arc<dyn Embedder>>,
    similarity: Option<Arc<dyn SimilarityStore>>,
    lexical: Option<Arc<dyn LexicalStore>>,
    chunks: Option<Arc<dyn ChunkRepository>>,
    reranker: Option<Arc<dyn Reranker>>,
    generator: Option<Arc<dyn Generator>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    similarity_monitor: Option<HealthMonitor>,
    lexical_monitor: Option<HealthMonitor>,
}

impl SearchOrchestratorBuilder {
    pub fn settings(mut self, settings: Settings) -> Self { self.settings = settings; self }
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self { self.embedder = Some(embedder); self }
    pub fn similarity_store(mut self, store: Arc<dyn SimilarityStore>) -> Self { self.similarity = Some(store); self }
    pub fn lexical_store(mut self, store: Arc<dyn LexicalStore>) -> Self { self.lexical = Some(store); self }
    pub fn chunk_repository(mut self, repo: Arc<dyn ChunkRepository>) -> Self { self.chunks = Some(repo); self }
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self { self.reranker = Some(reranker); self }
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self { self.generator = Some(generator); self }
    /// Shared L2 level of the response cache. Without it only L1 is used.
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> Self { self.cache_store = Some(store); self }
    pub fn similarity_monitor(mut self, monitor: HealthMonitor) -> Self { self.similarity_monitor = Some(monitor); self }
    pub fn lexical_monitor(mut self, monitor: HealthMonitor) -> Self { self.lexical_monitor = Some(monitor); self }

    pub fn build(self) -> Result<SearchOrchestrator> {
        self.settings.validate().map_err(|e| SearchError::Configuration(e.to_string()))?;
        if self.similarity.is_none() && self.lexical.is_none() {
            return Err(SearchError::Configuration("no retrieval backend configured".into()));
        }
        if self.similarity.is_some() && self.embedder.is_none() {
            return Err(SearchError::Configuration("similarity store configured without an embedder".into()));
        }
        let Some(chunks) = self.chunks else {
            return Err(SearchError::Configuration("no chunk repository configured".into()));
        };

        let Settings { search, cache, expansion, .. } = self.settings;
        let timeout = search.backend_timeout();
        let query_cache = search.cache_enabled.then(|| QueryCache::new(cache, self.cache_store));
        let hyde = self.embedder.clone().map(|e| HydeEngine::new(self.generator.clone(), e, expansion.clone(), timeout));
        let decomposer = Arc::new(QueryDecomposer::new(self.generator, expansion, timeout));

        Ok(SearchOrchestrator {
            resolver: ConflictResolver::new(search.source_priority.clone()),
            settings: search,
            embedder: self.embedder,
            similarity: self.similarity,
            lexical: self.lexical,
            chunks,
            reranker: self.reranker,
            fallback_reranker: LexicalOverlapReranker,
            cache: query_cache,
            hyde,
            multi_query: MultiQuerySearchEngine::new(decomposer),
            similarity_monitor: self.similarity_monitor,
            lexical_monitor: self.lexical_monitor,
        })
    }
}
