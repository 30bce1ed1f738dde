//! ragsearch-hybrid
//!
//! The search orchestrator composing retrieval, fusion, rerank, conflict
//! resolution, caching and query expansion into one request algorithm, plus
//! the local single-node wiring used by the CLI.

pub mod blocking;
pub mod builder;
pub mod indexer;
pub mod orchestrator;
pub mod stack;

pub use blocking::BlockingSearch;
pub use builder::SearchOrchestratorBuilder;
pub use indexer::ChunkIndexer;
pub use orchestrator::SearchOrchestrator;
pub use stack::LocalStack;
