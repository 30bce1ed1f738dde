use std::sync::Arc;

use tokio::runtime::Runtime;

use ragsearch_core::error::Result;
use ragsearch_core::types::{SearchRequest, SearchResponse};

use crate::orchestrator::SearchOrchestrator;

/// Blocking facade over a shared orchestrator for callers without an async
/// runtime. The same instance keeps serving async callers.
pub struct BlockingSearch {
    runtime: Runtime,
    orchestrator: Arc<SearchOrchestrator>,
}

impl BlockingSearch {
    /// Wrap `orchestrator` with a private multi-threaded runtime.
    pub fn new(orchestrator: Arc<SearchOrchestrator>) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build()?;
        Ok(Self { runtime, orchestrator })
    }

    /// Use an existing runtime, e.g. the one health monitors were spawned on.
    pub fn with_runtime(runtime: Runtime, orchestrator: Arc<SearchOrchestrator>) -> Self {
        Self { runtime, orchestrator }
    }

    /// Must not be called from within an async context.
    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.runtime.block_on(self.orchestrator.search(request))
    }

    pub fn orchestrator(&self) -> &Arc<SearchOrchestrator> { &self.orchestrator }

    pub fn runtime(&self) -> &Runtime { &self.runtime }
}
