use std::path::Path;

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use ragsearch_core::health::HealthProbe;
use ragsearch_core::traits::{BackendResult, LexicalStore};
use ragsearch_core::types::{ChunkRef, DocumentChunk, Filters, SearchHit, SourceKind, FILTERABLE_FIELDS};
use ragsearch_core::BackendError;

use crate::tantivy_utils::{build_schema, chunk_key, register_tokenizer};

#[derive(Clone, Copy)]
struct Fields {
	key: Field,
	tenant_id: Field,
	doc_id: Field,
	chunk_index: Field,
	source: Field,
	source_id: Field,
	text: Field,
}

#[derive(Clone)]
pub struct TantivyLexicalStore {
	index: Index,
	reader: IndexReader,
	fields: Fields,
}

impl TantivyLexicalStore {
	/// Open the index under `index_dir`, creating an empty one if absent.
	pub fn open_or_create(index_dir: &Path) -> anyhow::Result<Self> {
		std::fs::create_dir_all(index_dir)?;
		let index = match Index::open_in_dir(index_dir) {
			Ok(index) => index,
			Err(_) => { info!(dir = %index_dir.display(), "creating tantivy index"); Index::create_in_dir(index_dir, build_schema())? }
		};
		Self::from_index(index)
	}

	pub fn in_memory() -> anyhow::Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> anyhow::Result<Self> {
		register_tokenizer(&index);
		let schema = index.schema();
		let fields = Fields {
			key: schema.get_field("key")?,
			tenant_id: schema.get_field("tenant_id")?,
			doc_id: schema.get_field("doc_id")?,
			chunk_index: schema.get_field("chunk_index")?,
			source: schema.get_field("source")?,
			source_id: schema.get_field("source_id")?,
			text: schema.get_field("text")?,
		};
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields })
	}

	/// Add or replace chunks. Visible to searches once this returns.
	pub fn index(&self, chunks: &[DocumentChunk]) -> anyhow::Result<usize> {
		if chunks.is_empty() { return Ok(0); }
		let f = self.fields;
		let mut writer: tantivy::IndexWriter = self.index.writer(50_000_000)?;
		for c in chunks {
			let key = chunk_key(&c.tenant_id, &c.doc_id, c.chunk_index);
			writer.delete_term(Term::from_field_text(f.key, &key));
			writer.add_document(doc!(
				f.key => key,
				f.tenant_id => c.tenant_id.clone(),
				f.doc_id => c.doc_id.clone(),
				f.chunk_index => u64::from(c.chunk_index),
				f.source => c.source.clone(),
				f.source_id => c.source_id.clone(),
				f.text => c.text.clone(),
			))?;
		}
		writer.commit()?;
		self.reader.reload()?;
		debug!(count = chunks.len(), "indexed chunks into tantivy");
		Ok(chunks.len())
	}

	fn filter_field(&self, name: &str) -> Option<Field> {
		match name {
			"doc_id" => Some(self.fields.doc_id),
			"source" => Some(self.fields.source),
			"source_id" => Some(self.fields.source_id),
			_ => None,
		}
	}

	fn search_blocking(&self, query: &str, k: usize, tenant: &str, filters: &Filters) -> BackendResult<Vec<SearchHit>> {
		if k == 0 || query.trim().is_empty() { return Ok(Vec::new()); }
		let f = self.fields;
		let parser = QueryParser::for_index(&self.index, vec![f.text]);
		let (text_query, errors) = parser.parse_query_lenient(query);
		if !errors.is_empty() { debug!(errors = errors.len(), "lenient query parse dropped terms"); }

		let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
			(Occur::Must, text_query),
			(Occur::Must, Box::new(TermQuery::new(Term::from_field_text(f.tenant_id, tenant), IndexRecordOption::Basic))),
		];
		for (name, value) in filters {
			match self.filter_field(name) {
				Some(field) => clauses.push((Occur::Must, Box::new(TermQuery::new(Term::from_field_text(field, value), IndexRecordOption::Basic)))),
				None => return Err(BackendError::Malformed(format!("cannot filter on '{}', allowed: {:?}", name, FILTERABLE_FIELDS))),
			}
		}
		let query = BooleanQuery::new(clauses);

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(k)).map_err(BackendError::unavailable)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr).map_err(BackendError::unavailable)?;
			let doc_id = doc.get_first(f.doc_id).and_then(|v| v.as_str()).ok_or_else(|| BackendError::malformed("lexical hit without doc_id"))?;
			let chunk_index = doc.get_first(f.chunk_index).and_then(|v| v.as_u64()).ok_or_else(|| BackendError::malformed("lexical hit without chunk_index"))?;
			let chunk_index = u32::try_from(chunk_index).map_err(BackendError::malformed)?;
			hits.push(SearchHit::new(ChunkRef::new(doc_id, chunk_index), f64::from(score), SourceKind::Text));
		}
		Ok(hits)
	}
}

#[async_trait]
impl LexicalStore for TantivyLexicalStore {
	async fn bm25_search(&self, query: &str, k: usize, tenant: &str, filters: &Filters) -> BackendResult<Vec<SearchHit>> {
		let store = self.clone();
		let (query, tenant, filters) = (query.to_string(), tenant.to_string(), filters.clone());
		tokio::task::spawn_blocking(move || store.search_blocking(&query, k, &tenant, &filters))
			.await
			.map_err(BackendError::unavailable)?
	}
}

#[async_trait]
impl HealthProbe for TantivyLexicalStore {
	fn name(&self) -> &str { "tantivy" }
	/// Re-reads the index metadata and reloads the reader, so a removed or
	/// corrupted index directory reports as down.
	async fn probe(&self) -> Result<(), BackendError> {
		let store = self.clone();
		tokio::task::spawn_blocking(move || -> tantivy::Result<()> {
			store.index.load_metas()?;
			store.reader.reload()
		})
		.await
		.map_err(BackendError::unavailable)?
		.map_err(BackendError::unavailable)
	}
}
