//! ragsearch-text
//!
//! Tantivy-backed lexical store: tenant-scoped BM25 over chunk text with
//! equality filters on the stored identity fields.

pub mod store;
pub mod tantivy_utils;

pub use store::TantivyLexicalStore;
