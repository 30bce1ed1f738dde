use std::sync::Arc;

use anyhow::Result;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};
use tracing::{debug, info};

use ragsearch_core::health::HealthProbe;
use ragsearch_core::traits::{BackendResult, ChunkRepository, SimilarityStore};
use ragsearch_core::types::{ChunkRef, DocumentChunk, Filters, SearchHit, SourceKind, FILTERABLE_FIELDS};
use ragsearch_core::BackendError;

use crate::schema::{build_chunk_schema, sql_literal};

/// One LanceDB table holding chunk content alongside its embedding.
pub struct LanceChunkStore { db: Connection, table_name: String, dim: usize }

impl LanceChunkStore {
	pub async fn connect(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = connect(uri).execute().await?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	pub fn dim(&self) -> usize { self.dim }

	async fn ensure_table(&self) -> Result<Table> {
		let names = self.db.table_names().execute().await?;
		if !names.contains(&self.table_name) {
			info!(table = %self.table_name, "creating chunk table");
			let schema = build_chunk_schema(self.dim as i32);
			let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
			self.db.create_table(&self.table_name, Box::new(iter)).execute().await?;
		}
		Ok(self.db.open_table(&self.table_name).execute().await?)
	}

	/// Insert or replace chunks keyed by `(tenant_id, doc_id, chunk_index)`.
	pub async fn upsert(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<usize> {
		if chunks.is_empty() { return Ok(0); }
		anyhow::ensure!(chunks.len() == embeddings.len(), "chunks and embeddings length must match");
		if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dim) {
			anyhow::bail!("embedding dim {} does not match table dim {}", bad.len(), self.dim);
		}
		let table = self.ensure_table().await?;
		let batch = self.to_record_batch(chunks, embeddings)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		let mut mi = table.merge_insert(&["tenant_id", "doc_id", "chunk_index"]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await?;
		debug!(count = chunks.len(), table = %self.table_name, "upserted chunks");
		Ok(chunks.len())
	}

	fn to_record_batch(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
		let mut tenants = Vec::new(); let mut doc_ids = Vec::new(); let mut chunk_indices = Vec::new(); let mut texts = Vec::new();
		let mut sections = Vec::new(); let mut headings = Vec::new(); let mut sources = Vec::new(); let mut source_ids = Vec::new(); let mut versions = Vec::new();
		let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for (c, e) in chunks.iter().zip(embeddings) {
			tenants.push(c.tenant_id.clone()); doc_ids.push(c.doc_id.clone()); chunk_indices.push(i64::from(c.chunk_index)); texts.push(c.text.clone());
			sections.push(c.section_path.clone()); headings.push(serde_json::to_string(&c.heading_path)?); sources.push(c.source.clone()); source_ids.push(c.source_id.clone()); versions.push(c.version);
			vectors.push(Some(e.iter().map(|&x| Some(x)).collect()));
		}
		let batch = RecordBatch::try_new(build_chunk_schema(self.dim as i32), vec![
			Arc::new(StringArray::from(tenants)),
			Arc::new(StringArray::from(doc_ids)),
			Arc::new(Int64Array::from(chunk_indices)),
			Arc::new(StringArray::from(texts)),
			Arc::new(StringArray::from(sections)),
			Arc::new(StringArray::from(headings)),
			Arc::new(StringArray::from(sources)),
			Arc::new(StringArray::from(source_ids)),
			Arc::new(Int64Array::from(versions)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim as i32)),
		])?;
		Ok(batch)
	}

	async fn open(&self) -> BackendResult<Table> {
		self.db.open_table(&self.table_name).execute().await.map_err(BackendError::unavailable)
	}
}

/// Tenant predicate plus one equality clause per supported filter.
fn build_predicate(tenant: &str, filters: &Filters) -> BackendResult<String> {
	let mut clauses = vec![format!("tenant_id = {}", sql_literal(tenant))];
	for (column, value) in filters {
		if !FILTERABLE_FIELDS.contains(&column.as_str()) {
			return Err(BackendError::Malformed(format!("cannot filter on '{}', allowed: {:?}", column, FILTERABLE_FIELDS)));
		}
		clauses.push(format!("{} = {}", column, sql_literal(value)));
	}
	Ok(clauses.join(" AND "))
}

fn refs_predicate(tenant: &str, refs: &[ChunkRef]) -> String {
	let any_of = refs.iter()
		.map(|r| format!("(doc_id = {} AND chunk_index = {})", sql_literal(&r.doc_id), r.chunk_index))
		.collect::<Vec<_>>()
		.join(" OR ");
	format!("tenant_id = {} AND ({})", sql_literal(tenant), any_of)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> BackendResult<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| BackendError::Malformed(format!("column '{}' missing or not utf8", name)))
}

fn i64_col<'a>(batch: &'a RecordBatch, name: &str) -> BackendResult<&'a Int64Array> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int64Array>())
		.ok_or_else(|| BackendError::Malformed(format!("column '{}' missing or not int64", name)))
}

fn chunk_index_at(col: &Int64Array, row: usize) -> BackendResult<u32> {
	u32::try_from(col.value(row)).map_err(|_| BackendError::Malformed(format!("chunk_index {} out of range", col.value(row))))
}

#[async_trait]
impl SimilarityStore for LanceChunkStore {
	async fn search(&self, vector: &[f32], limit: usize, tenant: &str, filters: &Filters) -> BackendResult<Vec<SearchHit>> {
		if limit == 0 { return Ok(Vec::new()); }
		if vector.len() != self.dim {
			return Err(BackendError::Malformed(format!("query vector dim {} != {}", vector.len(), self.dim)));
		}
		let predicate = build_predicate(tenant, filters)?;
		let table = self.open().await?;
		let mut stream = table.vector_search(vector.to_vec()).map_err(BackendError::unavailable)?
			.only_if(predicate)
			.limit(limit)
			.execute().await.map_err(BackendError::unavailable)?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(BackendError::unavailable)? {
			let doc_ids = string_col(&batch, "doc_id")?;
			let chunk_indices = i64_col(&batch, "chunk_index")?;
			let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
			for i in 0..batch.num_rows() {
				// Map distance to a similarity where higher is better.
				let score = distances.map(|d| 1.0 / (1.0 + f64::from(d.value(i)))).unwrap_or(0.0);
				hits.push(SearchHit::new(ChunkRef::new(doc_ids.value(i), chunk_index_at(chunk_indices, i)?), score, SourceKind::Vector));
			}
		}
		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		Ok(hits)
	}
}

#[async_trait]
impl ChunkRepository for LanceChunkStore {
	async fn get_chunks_by_ids(&self, tenant: &str, refs: &[ChunkRef]) -> BackendResult<Vec<DocumentChunk>> {
		if refs.is_empty() { return Ok(Vec::new()); }
		let table = self.open().await?;
		let mut stream = table.query()
			.only_if(refs_predicate(tenant, refs))
			.limit(refs.len())
			.execute().await.map_err(BackendError::unavailable)?;
		let mut chunks = Vec::with_capacity(refs.len());
		while let Some(batch) = stream.try_next().await.map_err(BackendError::unavailable)? {
			let tenants = string_col(&batch, "tenant_id")?;
			let doc_ids = string_col(&batch, "doc_id")?;
			let chunk_indices = i64_col(&batch, "chunk_index")?;
			let texts = string_col(&batch, "text")?;
			let sections = string_col(&batch, "section_path")?;
			let headings = string_col(&batch, "heading_path")?;
			let sources = string_col(&batch, "source")?;
			let source_ids = string_col(&batch, "source_id")?;
			let versions = i64_col(&batch, "version")?;
			for i in 0..batch.num_rows() {
				let heading_path: Vec<String> = if headings.is_null(i) || headings.value(i).is_empty() { Vec::new() }
					else { serde_json::from_str(headings.value(i)).map_err(BackendError::malformed)? };
				chunks.push(DocumentChunk {
					tenant_id: tenants.value(i).to_string(),
					doc_id: doc_ids.value(i).to_string(),
					chunk_index: chunk_index_at(chunk_indices, i)?,
					text: texts.value(i).to_string(),
					section_path: sections.value(i).to_string(),
					heading_path,
					source: sources.value(i).to_string(),
					source_id: source_ids.value(i).to_string(),
					version: versions.value(i),
				});
			}
		}
		Ok(chunks)
	}
}

#[async_trait]
impl HealthProbe for LanceChunkStore {
	fn name(&self) -> &str { "lancedb" }
	async fn probe(&self) -> Result<(), BackendError> {
		self.db.table_names().execute().await.map(|_| ()).map_err(BackendError::unavailable)
	}
}
