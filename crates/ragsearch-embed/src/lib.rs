//! Embedding providers.
//!
//! `HashingEmbedder` is a deterministic, model-free feature hasher used in
//! development and tests; `HttpEmbedder` calls a remote embedding endpoint.
//! Both return L2-normalized vectors of a fixed dimensionality.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twox_hash::XxHash64;

use ragsearch_core::config::EndpointSettings;
use ragsearch_core::traits::{BackendResult, Embedder};
use ragsearch_core::BackendError;

pub struct HashingEmbedder { dim: usize }

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize { self.dim }
    async fn embed_batch(&self, texts: &[String]) -> BackendResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> { model: &'a str, input: &'a [String] }

#[derive(Deserialize)]
struct EmbedResponse { embeddings: Vec<Vec<f32>> }

/// Client for an Ollama-compatible `POST {base}/api/embed` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dim: usize, timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into().trim_end_matches('/').to_string(), model: model.into(), dim, timeout }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, texts: &[String]) -> BackendResult<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let url = format!("{}/api/embed", self.base_url);
        let resp = self.client.post(&url).timeout(self.timeout)
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send().await
            .map_err(|e| if e.is_timeout() { BackendError::Timeout(self.timeout) } else { BackendError::unavailable(e) })?;
        if !resp.status().is_success() {
            return Err(BackendError::Unavailable(format!("embedder returned {}", resp.status())));
        }
        let body: EmbedResponse = resp.json().await.map_err(BackendError::malformed)?;
        if body.embeddings.len() != texts.len() {
            return Err(BackendError::Malformed(format!("expected {} embeddings, got {}", texts.len(), body.embeddings.len())));
        }
        if let Some(bad) = body.embeddings.iter().find(|e| e.len() != self.dim) {
            return Err(BackendError::Malformed(format!("expected dim {}, got {}", self.dim, bad.len())));
        }
        debug!(count = texts.len(), "embedded batch remotely");
        Ok(body.embeddings)
    }
}

/// Pick the embedder for the configured endpoints.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder regardless of the
/// configured endpoint.
pub fn get_default_embedder(endpoints: &EndpointSettings, timeout: Duration) -> Box<dyn Embedder> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    match (&endpoints.embedder_url, use_fake) {
        (Some(url), false) => {
            info!(url = %url, model = %endpoints.embedder_model, "using remote embedder");
            Box::new(HttpEmbedder::new(url.clone(), endpoints.embedder_model.clone(), endpoints.embedding_dim, timeout))
        }
        _ => {
            info!(dim = endpoints.embedding_dim, "using hashing embedder");
            Box::new(HashingEmbedder::new(endpoints.embedding_dim))
        }
    }
}
