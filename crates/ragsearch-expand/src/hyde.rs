//! Hypothetical document embeddings.
//!
//! The query is answered by the generation backend and the answer, not the
//! query, is embedded for similarity search. Generated answers and their
//! embeddings are cached separately: answers by query, embeddings by answer
//! text, so two queries producing the same answer share one embedding.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ragsearch_cache::keys::{embedding_key, hyde_document_key};
use ragsearch_cache::TtlLru;
use ragsearch_core::config::ExpansionSettings;
use ragsearch_core::error::with_timeout;
use ragsearch_core::traits::{BackendResult, Embedder, Generator};

use crate::EXPANSION_CACHE_TTL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypotheticalDocument {
    pub query: String,
    pub hypothetical_answer: String,
    /// Empty until [`HydeEngine::embed_hypothetical`] has run.
    pub embedding: Vec<f32>,
    /// The answer is the local stub rather than generated text.
    pub fallback: bool,
}

pub struct HydeEngine {
    generator: Option<Arc<dyn Generator>>,
    embedder: Arc<dyn Embedder>,
    settings: ExpansionSettings,
    timeout: Duration,
    documents: TtlLru<String>,
    embeddings: TtlLru<Vec<f32>>,
}

pub fn fallback_answer(query: &str) -> String {
    format!("Answer about {}", query.trim())
}

fn prompt(query: &str, max_words: usize) -> String {
    format!(
        "Write a short passage from a reference document that directly answers the question below. \
         Use at most {max_words} words and do not restate the question.\n\nQuestion: {}\n\nPassage:",
        query.trim()
    )
}

fn clamp_words(text: &str, max_words: usize) -> String {
    text.split_whitespace().take(max_words).collect::<Vec<_>>().join(" ")
}

impl HydeEngine {
    pub fn new(generator: Option<Arc<dyn Generator>>, embedder: Arc<dyn Embedder>, settings: ExpansionSettings, timeout: Duration) -> Self {
        let documents = TtlLru::new(settings.cache_capacity);
        let embeddings = TtlLru::new(settings.cache_capacity);
        Self { generator, embedder, settings, timeout, documents, embeddings }
    }

    /// Never fails: any generation problem yields the stub answer.
    pub async fn generate_hypothetical(&self, query: &str) -> HypotheticalDocument {
        let key = hyde_document_key(query);
        if let Some(answer) = self.documents.get(&key) {
            debug!("hyde document cache hit");
            return HypotheticalDocument { query: query.to_string(), hypothetical_answer: answer, embedding: Vec::new(), fallback: false };
        }
        let generated = match &self.generator {
            Some(generator) => {
                let prompt = prompt(query, self.settings.hyde_max_words);
                let call = generator.generate(&prompt, self.settings.hyde_max_tokens, self.settings.temperature);
                match with_timeout(self.timeout, call).await {
                    Ok(text) if !text.trim().is_empty() => Some(clamp_words(&text, self.settings.hyde_max_words)),
                    Ok(_) => { warn!("generator returned an empty hypothetical answer, using stub"); None }
                    Err(e) => { warn!(error = %e, "hyde generation failed, using stub"); None }
                }
            }
            None => None,
        };
        match generated {
            Some(answer) => {
                self.documents.insert(key, answer.clone(), EXPANSION_CACHE_TTL, &[]);
                HypotheticalDocument { query: query.to_string(), hypothetical_answer: answer, embedding: Vec::new(), fallback: false }
            }
            None => HypotheticalDocument { query: query.to_string(), hypothetical_answer: fallback_answer(query), embedding: Vec::new(), fallback: true },
        }
    }

    pub async fn embed_hypothetical(&self, doc: &HypotheticalDocument) -> BackendResult<Vec<f32>> {
        let key = embedding_key(&doc.hypothetical_answer);
        if let Some(v) = self.embeddings.get(&key) {
            debug!("hyde embedding cache hit");
            return Ok(v);
        }
        let v = with_timeout(self.timeout, self.embedder.embed(&doc.hypothetical_answer)).await?;
        self.embeddings.insert(key, v.clone(), EXPANSION_CACHE_TTL, &[]);
        Ok(v)
    }

    /// Generate and embed in one step. Only the embedding call can fail.
    pub async fn expand(&self, query: &str) -> BackendResult<HypotheticalDocument> {
        let mut doc = self.generate_hypothetical(query).await;
        doc.embedding = self.embed_hypothetical(&doc).await?;
        Ok(doc)
    }

    pub fn clear_cache(&self) {
        self.documents.clear();
        self.embeddings.clear();
    }

    pub fn cached_documents(&self) -> usize { self.documents.len() }

    pub fn cached_embeddings(&self) -> usize { self.embeddings.len() }
}
