//! Wiring of the single-node stack from configuration: tantivy for lexical
//! search, LanceDB for similarity search and chunk content, the in-process
//! TTL store as the shared cache level.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ragsearch_cache::MemoryTtlStore;
use ragsearch_core::config::{resolve_with_base, Settings};
use ragsearch_core::health::{BackoffPolicy, HealthMonitor};
use ragsearch_core::traits::Embedder;
use ragsearch_embed::get_default_embedder;
use ragsearch_expand::get_default_generator;
use ragsearch_rank::HttpReranker;
use ragsearch_text::TantivyLexicalStore;
use ragsearch_vector::LanceChunkStore;

use crate::indexer::ChunkIndexer;
use crate::orchestrator::SearchOrchestrator;

const PROBE_INTERVAL: Duration = Duration::from_secs(15);

pub struct LocalStack {
    pub orchestrator: Arc<SearchOrchestrator>,
    pub indexer: ChunkIndexer,
    /// Cancels the health monitors.
    pub token: CancellationToken,
}

impl LocalStack {
    /// Open (or create) both indexes under `base_dir` and assemble the
    /// orchestrator. Must run inside a tokio runtime.
    pub async fn open(settings: Settings, base_dir: &Path) -> Result<Self> {
        let endpoints = settings.endpoints.clone();
        let timeout = settings.search.backend_timeout();

        let tantivy_dir = resolve_with_base(base_dir, &endpoints.tantivy_index_dir);
        let lancedb_dir = resolve_with_base(base_dir, &endpoints.lancedb_uri);
        let lexical = TantivyLexicalStore::open_or_create(&tantivy_dir)?;
        let vector = Arc::new(LanceChunkStore::connect(&lancedb_dir.to_string_lossy(), &endpoints.lancedb_table, endpoints.embedding_dim).await?);
        info!(tantivy = %tantivy_dir.display(), lancedb = %lancedb_dir.display(), "opened indexes");

        let embedder: Arc<dyn Embedder> = Arc::from(get_default_embedder(&endpoints, timeout));
        let token = CancellationToken::new();
        let policy = BackoffPolicy::default();

        let mut builder = SearchOrchestrator::builder()
            .settings(settings)
            .embedder(embedder.clone())
            .similarity_store(vector.clone())
            .lexical_store(Arc::new(lexical.clone()))
            .chunk_repository(vector.clone())
            .cache_store(Arc::new(MemoryTtlStore::new()))
            .similarity_monitor(HealthMonitor::spawn(vector.clone(), policy, PROBE_INTERVAL, token.child_token()))
            .lexical_monitor(HealthMonitor::spawn(Arc::new(lexical.clone()), policy, PROBE_INTERVAL, token.child_token()));
        if let Some(url) = &endpoints.reranker_url {
            info!(url = %url, "using remote reranker");
            builder = builder.reranker(Arc::new(HttpReranker::new(url.clone())));
        }
        if let Some(generator) = get_default_generator(&endpoints, timeout) {
            builder = builder.generator(generator);
        }
        let orchestrator = Arc::new(builder.build()?);

        Ok(Self { orchestrator, indexer: ChunkIndexer::new(embedder, lexical, vector), token })
    }
}
