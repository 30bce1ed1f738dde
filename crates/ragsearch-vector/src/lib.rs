//! ragsearch-vector
//!
//! LanceDB-backed chunk table serving two collaborator roles: similarity
//! search over chunk embeddings and batch hydration of chunk content.

pub mod schema;
pub mod store;

pub use store::LanceChunkStore;
