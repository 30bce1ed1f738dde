//! Domain types shared by the stores, the ranking stages and the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ChunkId = String;

/// Caller-supplied equality filters (`field -> value`). Ordered so that cache
/// keys derived from them are stable.
pub type Filters = BTreeMap<String, String>;

/// Chunk fields every store can filter on.
pub const FILTERABLE_FIELDS: &[&str] = &["doc_id", "source", "source_id"];

/// First filter naming a field outside [`FILTERABLE_FIELDS`].
pub fn unsupported_filter(filters: &Filters) -> Option<&str> {
    filters.keys().map(String::as_str).find(|name| !FILTERABLE_FIELDS.contains(name))
}

/// Position of a chunk inside its parent document.
///
/// The textual id `doc_id:chunk_index` is the identity used by every ranked
/// list; `doc_id` may itself contain `:` so parsing splits on the last one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkRef {
    pub doc_id: String,
    pub chunk_index: u32,
}

impl ChunkRef {
    pub fn new(doc_id: impl Into<String>, chunk_index: u32) -> Self {
        Self { doc_id: doc_id.into(), chunk_index }
    }

    pub fn id(&self) -> ChunkId {
        format!("{}:{}", self.doc_id, self.chunk_index)
    }

    pub fn parse(id: &str) -> Option<Self> {
        let (doc_id, idx) = id.rsplit_once(':')?;
        if doc_id.is_empty() { return None; }
        Some(Self { doc_id: doc_id.to_string(), chunk_index: idx.parse().ok()? })
    }
}

/// A chunk record as held by the chunk repository.
///
/// - `tenant_id`: owning tenant, every query is scoped by it
/// - `doc_id`/`chunk_index`: physical identity of this ingestion
/// - `source`/`source_id`/`version`: logical identity across re-ingestions,
///   used by conflict resolution
/// - `section_path`/`heading_path`: structural location used for citations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    #[serde(default)]
    pub tenant_id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub text: String,
    #[serde(default)]
    pub section_path: String,
    #[serde(default)]
    pub heading_path: Vec<String>,
    pub source: String,
    pub source_id: String,
    #[serde(default)]
    pub version: i64,
}

impl DocumentChunk {
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef::new(self.doc_id.clone(), self.chunk_index)
    }

    pub fn id(&self) -> ChunkId {
        self.chunk_ref().id()
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Text,
}

/// The minimal surface returned by both retrieval stores.
///
/// `score` is engine-specific but higher is always better; only the order of
/// a hit list matters for RRF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f64,
    pub source: SourceKind,
    pub chunk: ChunkRef,
}

impl SearchHit {
    pub fn new(chunk: ChunkRef, score: f64, source: SourceKind) -> Self {
        Self { id: chunk.id(), score, source, chunk }
    }
}

/// A hydrated candidate flowing through rerank and conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub id: ChunkId,
    pub doc_id: String,
    pub chunk_index: u32,
    pub score: f64,
    pub source: String,
    pub source_id: String,
    pub version: i64,
    pub text: String,
    pub section_path: String,
    pub heading_path: Vec<String>,
}

impl SearchCandidate {
    pub fn from_chunk(chunk: DocumentChunk, score: f64) -> Self {
        Self {
            id: chunk.id(),
            doc_id: chunk.doc_id,
            chunk_index: chunk.chunk_index,
            score,
            source: chunk.source,
            source_id: chunk.source_id,
            version: chunk.version,
            text: chunk.text,
            section_path: chunk.section_path,
            heading_path: chunk.heading_path,
        }
    }

    pub fn citation(&self) -> Citation {
        let label = if self.section_path.is_empty() {
            format!("{} ({}), v{}", self.source_id, self.source, self.version)
        } else {
            format!("{} ({}) § {}, v{}", self.source_id, self.source, self.section_path, self.version)
        };
        Citation {
            doc_id: self.doc_id.clone(),
            chunk_index: self.chunk_index,
            source: self.source.clone(),
            source_id: self.source_id.clone(),
            version: self.version,
            section_path: self.section_path.clone(),
            heading_path: self.heading_path.clone(),
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: String,
    pub chunk_index: u32,
    pub source: String,
    pub source_id: String,
    pub version: i64,
    pub section_path: String,
    pub heading_path: Vec<String>,
    pub label: String,
}

/// Which query-expansion strategy served a request. Exactly one per request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionMode {
    #[default]
    None,
    Hyde,
    Decomposition,
}

fn default_top_k() -> usize { 10 }
fn default_true() -> bool { true }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub tenant_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub use_hyde: bool,
    #[serde(default)]
    pub use_decomposition: bool,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tenant_id: tenant_id.into(),
            top_k: default_top_k(),
            filters: Filters::new(),
            use_hyde: false,
            use_decomposition: false,
            use_cache: true,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self { self.top_k = top_k; self }
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self { self.filters.insert(field.into(), value.into()); self }
    pub fn with_hyde(mut self) -> Self { self.use_hyde = true; self }
    pub fn with_decomposition(mut self) -> Self { self.use_decomposition = true; self }
    pub fn without_cache(mut self) -> Self { self.use_cache = false; self }

    /// The expansion mode implied by the request flags. HyDE takes precedence
    /// when both flags are set.
    pub fn expansion(&self) -> ExpansionMode {
        if self.use_hyde {
            ExpansionMode::Hyde
        } else if self.use_decomposition {
            ExpansionMode::Decomposition
        } else {
            ExpansionMode::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub source: String,
    pub source_id: String,
    pub version: i64,
    pub chunk_index: u32,
    pub score: f64,
    pub text: String,
    pub section_path: String,
    pub heading_path: Vec<String>,
    pub citation: Citation,
}

impl From<SearchCandidate> for SearchResult {
    fn from(c: SearchCandidate) -> Self {
        let citation = c.citation();
        Self {
            doc_id: c.doc_id,
            source: c.source,
            source_id: c.source_id,
            version: c.version,
            chunk_index: c.chunk_index,
            score: c.score,
            text: c.text,
            section_path: c.section_path,
            heading_path: c.heading_path,
            citation,
        }
    }
}

/// The response contract exposed to the routing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub time_ms: u64,
    pub cached: bool,
    pub hyde_used: bool,
    pub decomposition_used: bool,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub expansion: ExpansionMode,
    #[serde(default)]
    pub conflicts: usize,
    #[serde(default)]
    pub sub_queries: Vec<String>,
}
