//! Collaborator contracts consumed by the retrieval core.
//!
//! Every method is async and returns [`BackendError`] on transient failure;
//! callers decide whether to degrade. Implementations must be shareable
//! across concurrent requests (`Send + Sync`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, SearchError};
use crate::types::{ChunkRef, DocumentChunk, Filters, SearchHit, SearchRequest, SearchResponse};

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> BackendResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> BackendResult<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        if out.is_empty() {
            return Err(BackendError::malformed("embedder returned no vectors"));
        }
        Ok(out.swap_remove(0))
    }
}

/// Approximate nearest-neighbour search over chunk embeddings.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    async fn search(&self, vector: &[f32], limit: usize, tenant: &str, filters: &Filters) -> BackendResult<Vec<SearchHit>>;
}

/// Keyword (BM25) search over chunk text.
#[async_trait]
pub trait LexicalStore: Send + Sync {
    async fn bm25_search(&self, query: &str, k: usize, tenant: &str, filters: &Filters) -> BackendResult<Vec<SearchHit>>;
}

/// Batch lookup of full chunk content. Unknown refs are simply absent from
/// the output.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    async fn get_chunks_by_ids(&self, tenant: &str, refs: &[ChunkRef]) -> BackendResult<Vec<DocumentChunk>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankItem {
    pub id: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub id: String,
    pub score: f64,
}

/// Secondary scoring pass over a shortlist. Output is ordered best first.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, items: &[RerankItem]) -> BackendResult<Vec<RerankScore>>;
}

/// Prompt-completion oracle used by query expansion only.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> BackendResult<String>;
}

/// Shared TTL key-value store backing the L2 cache level.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> BackendResult<()>;
    async fn delete(&self, key: &str) -> BackendResult<bool>;
    /// Keys matching a `prefix*` style pattern, at most `cap` of them.
    async fn scan_by_pattern(&self, pattern: &str, cap: usize) -> BackendResult<Vec<String>>;
    async fn clear(&self) -> BackendResult<()>;
    async fn ping(&self) -> BackendResult<()>;
}

/// The search operation exposed upward to the routing layer.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, request: SearchRequest) -> std::result::Result<SearchResponse, SearchError>;
}
