use arrow_schema::{Schema, Field, DataType};
use std::sync::Arc;

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("tenant_id", DataType::Utf8, false),
		Field::new("doc_id", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int64, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("section_path", DataType::Utf8, false),
		// JSON-encoded array of headings
		Field::new("heading_path", DataType::Utf8, false),
		Field::new("source", DataType::Utf8, false),
		Field::new("source_id", DataType::Utf8, false),
		Field::new("version", DataType::Int64, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Quote a string literal for a Lance SQL predicate.
pub fn sql_literal(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}
