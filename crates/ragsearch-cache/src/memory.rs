//! In-process TTL key-value store implementing the shared cache contract.
//!
//! Suitable as the L2 level for a single-node deployment and for tests.
//! Expired entries are removed lazily on access and during scans.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use ragsearch_core::health::HealthProbe;
use ragsearch_core::traits::{BackendResult, CacheStore};
use ragsearch_core::BackendError;

#[derive(Default)]
pub struct MemoryTtlStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryTtlStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// `prefix*` matches by prefix; anything else must match exactly.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl CacheStore for MemoryTtlStore {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let now = Instant::now();
        let live = self.entries.get(key).map(|e| (e.1 > now).then(|| e.0.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => { self.entries.remove_if(key, |_, (_, exp)| *exp <= now); Ok(None) }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> BackendResult<()> {
        self.entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan_by_pattern(&self, pattern: &str, cap: usize) -> BackendResult<Vec<String>> {
        let now = Instant::now();
        self.entries.retain(|_, (_, exp)| *exp > now);
        Ok(self.entries.iter().map(|e| e.key().clone()).filter(|k| pattern_matches(pattern, k)).take(cap).collect())
    }

    async fn clear(&self) -> BackendResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn ping(&self) -> BackendResult<()> { Ok(()) }
}

#[async_trait]
impl HealthProbe for MemoryTtlStore {
    fn name(&self) -> &str { "memory-ttl-store" }
    async fn probe(&self) -> Result<(), BackendError> { self.ping().await }
}
