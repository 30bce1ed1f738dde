use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use ragsearch_core::config::EndpointSettings;
use ragsearch_core::traits::{BackendResult, Generator};
use ragsearch_core::BackendError;

#[derive(Serialize)]
struct GenerateOptions { num_predict: u32, temperature: f32 }

#[derive(Serialize)]
struct GenerateRequest<'a> { model: &'a str, prompt: &'a str, stream: bool, options: GenerateOptions }

#[derive(Deserialize)]
struct GenerateResponse { response: String }

/// Client for an Ollama-compatible `POST {base}/api/generate` endpoint.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into().trim_end_matches('/').to_string(), model: model.into(), timeout }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> BackendResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { num_predict: max_tokens, temperature },
        };
        let resp = self.client.post(&url).timeout(self.timeout).json(&body).send().await
            .map_err(|e| if e.is_timeout() { BackendError::Timeout(self.timeout) } else { BackendError::unavailable(e) })?;
        if !resp.status().is_success() {
            return Err(BackendError::Unavailable(format!("generator returned {}", resp.status())));
        }
        let body: GenerateResponse = resp.json().await.map_err(BackendError::malformed)?;
        Ok(body.response)
    }
}

/// The configured generation backend, if any. Expansion runs its local
/// fallbacks when this is `None`.
pub fn get_default_generator(endpoints: &EndpointSettings, timeout: Duration) -> Option<Arc<dyn Generator>> {
    let url = endpoints.generator_url.as_ref()?;
    info!(url = %url, model = %endpoints.generator_model, "using remote generator");
    Some(Arc::new(HttpGenerator::new(url.clone(), endpoints.generator_model.clone(), timeout)))
}
