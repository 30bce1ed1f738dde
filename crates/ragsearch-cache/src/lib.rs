//! ragsearch-cache
//!
//! Two-level query cache: a process-local TTL-stamped LRU (L1) in front of a
//! shared TTL key-value store (L2), plus the named key builders used by every
//! cache in the workspace.

pub mod keys;
pub mod lru_ttl;
pub mod memory;
pub mod query_cache;

pub use lru_ttl::TtlLru;
pub use memory::MemoryTtlStore;
pub use query_cache::{CacheStats, InvalidationReport, QueryCache};
