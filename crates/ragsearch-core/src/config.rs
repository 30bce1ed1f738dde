//! Lightweight configuration loader and typed settings.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Every typed section carries defaults, so an empty configuration is valid.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    /// Build from an inline TOML document layered over the defaults.
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let figment = Figment::new().merge(Toml::string(toml));
        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub expansion: ExpansionSettings,
    pub endpoints: EndpointSettings,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.search;
        if s.max_top_k == 0 { anyhow::bail!("search.max_top_k must be positive"); }
        if s.rrf_k == 0 { anyhow::bail!("search.rrf_k must be positive"); }
        if s.vector_weight < 0.0 || s.lexical_weight < 0.0 { anyhow::bail!("fusion weights must be non-negative"); }
        if self.cache.l1_capacity == 0 { anyhow::bail!("cache.l1_capacity must be positive"); }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    #[default]
    Rrf,
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub fusion: FusionMethod,
    pub rrf_k: u32,
    pub vector_weight: f64,
    pub lexical_weight: f64,
    pub rerank_top_n: usize,
    pub max_top_k: usize,
    pub cache_enabled: bool,
    pub backend_timeout_ms: u64,
    pub source_priority: HashMap<String, i64>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            fusion: FusionMethod::Rrf,
            rrf_k: 60,
            vector_weight: 0.6,
            lexical_weight: 0.4,
            rerank_top_n: 20,
            max_top_k: 100,
            cache_enabled: true,
            backend_timeout_ms: 5_000,
            source_priority: HashMap::new(),
        }
    }
}

impl SearchSettings {
    pub fn backend_timeout(&self) -> Duration { Duration::from_millis(self.backend_timeout_ms) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub l1_capacity: usize,
    pub ttl_secs: u64,
    pub l2_timeout_ms: u64,
    /// Upper bound on keys visited by a tenant purge of the shared level.
    pub scan_cap: usize,
    pub namespace: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { l1_capacity: 1024, ttl_secs: 3600, l2_timeout_ms: 250, scan_cap: 10_000, namespace: "ragsearch".to_string() }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
    pub fn l2_timeout(&self) -> Duration { Duration::from_millis(self.l2_timeout_ms) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionSettings {
    pub max_sub_queries: usize,
    pub hyde_max_words: usize,
    pub hyde_max_tokens: u32,
    pub decompose_max_tokens: u32,
    pub temperature: f32,
    pub cache_capacity: usize,
    pub min_words_for_split: usize,
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self {
            max_sub_queries: 4,
            hyde_max_words: 150,
            hyde_max_tokens: 256,
            decompose_max_tokens: 512,
            temperature: 0.3,
            cache_capacity: 512,
            min_words_for_split: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub reranker_url: Option<String>,
    pub generator_url: Option<String>,
    pub generator_model: String,
    pub embedder_url: Option<String>,
    pub embedder_model: String,
    pub embedding_dim: usize,
    pub tantivy_index_dir: String,
    pub lancedb_uri: String,
    pub lancedb_table: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            reranker_url: None,
            generator_url: None,
            generator_model: "llama3".to_string(),
            embedder_url: None,
            embedder_model: "bge-m3".to_string(),
            embedding_dim: 384,
            tantivy_index_dir: "./data/indexes/tantivy".to_string(),
            lancedb_uri: "./data/indexes/lancedb".to_string(),
            lancedb_table: "chunks".to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
