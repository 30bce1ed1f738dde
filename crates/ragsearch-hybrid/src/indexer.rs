use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ragsearch_core::traits::Embedder;
use ragsearch_core::types::DocumentChunk;
use ragsearch_text::TantivyLexicalStore;
use ragsearch_vector::LanceChunkStore;

const EMBED_BATCH: usize = 64;

/// Writes chunks into both stores: embeddings and content into LanceDB,
/// text into tantivy.
pub struct ChunkIndexer {
    embedder: Arc<dyn Embedder>,
    lexical: TantivyLexicalStore,
    vector: Arc<LanceChunkStore>,
}

impl ChunkIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, lexical: TantivyLexicalStore, vector: Arc<LanceChunkStore>) -> Self {
        Self { embedder, lexical, vector }
    }

    pub async fn index(&self, chunks: &[DocumentChunk]) -> Result<usize> {
        if chunks.is_empty() { return Ok(0); }
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            anyhow::ensure!(vectors.len() == batch.len(), "embedder returned {} vectors for {} texts", vectors.len(), batch.len());
            embeddings.extend(vectors);
        }
        self.vector.upsert(chunks, &embeddings).await?;

        let lexical = self.lexical.clone();
        let owned = chunks.to_vec();
        tokio::task::spawn_blocking(move || lexical.index(&owned)).await??;
        info!(count = chunks.len(), "indexed chunks");
        Ok(chunks.len())
    }
}
