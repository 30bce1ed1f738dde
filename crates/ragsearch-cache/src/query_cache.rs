use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ragsearch_core::config::CacheSettings;
use ragsearch_core::error::with_timeout;
use ragsearch_core::traits::CacheStore;

use crate::keys::{query_cache_key, tenant_scan_pattern};
use crate::lru_ttl::TtlLru;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, `0` before any traffic.
    pub hit_rate: f64,
    pub l2_hits: u64,
    pub l1_size: usize,
    pub l1_capacity: usize,
    pub l2_configured: bool,
    pub l2_reachable: bool,
}

/// Outcome of a tenant purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub l1_removed: usize,
    pub l2_removed: usize,
    /// False when the L2 scan hit its cap or failed; some entries of the
    /// tenant may then survive in L2 until their TTL lapses.
    pub l2_complete: bool,
}

/// Shared-level payload. Creation time and lifetime travel with the value so
/// a backfilled L1 copy never outlives the entry it was read from.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    created_at_ms: u64,
    ttl_ms: u64,
}

impl<T> Envelope<T> {
    /// Lifetime left at `now_ms`, `None` once elapsed.
    fn remaining(&self, now_ms: u64) -> Option<Duration> {
        let expires_at = self.created_at_ms.saturating_add(self.ttl_ms);
        (expires_at > now_ms).then(|| Duration::from_millis(expires_at - now_ms))
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Two-level cache of serializable values keyed by `(query, tenant, modifiers)`.
///
/// L1 is bounded, process-local and LRU-evicted. L2 is optional, shared and
/// authoritative across instances; every L2 call runs under its own timeout
/// and an L2 failure only ever degrades to a miss.
pub struct QueryCache<V> {
    l1: TtlLru<V>,
    l2: Option<Arc<dyn CacheStore>>,
    settings: CacheSettings,
    hits: AtomicU64,
    misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_reachable: AtomicBool,
    _marker: PhantomData<fn() -> V>,
}

impl<V> QueryCache<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(settings: CacheSettings, l2: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            l1: TtlLru::new(settings.l1_capacity),
            l2,
            settings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            l2_reachable: AtomicBool::new(true),
            _marker: PhantomData,
        }
    }

    pub fn key(&self, query: &str, tenant: &str, modifiers: &[String]) -> String {
        query_cache_key(&self.settings.namespace, tenant, query, modifiers)
    }

    fn mark_l2(&self, ok: bool) {
        let was = self.l2_reachable.swap(ok, Ordering::SeqCst);
        if was && !ok { warn!("shared cache unreachable, serving from local cache only"); }
        if !was && ok { debug!("shared cache reachable again"); }
    }

    pub async fn get(&self, query: &str, tenant: &str, modifiers: &[String]) -> Option<V> {
        let key = self.key(query, tenant, modifiers);
        if let Some(v) = self.l1.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(v);
        }
        if let Some(l2) = &self.l2 {
            match with_timeout(self.settings.l2_timeout(), l2.get(&key)).await {
                Ok(Some(raw)) => {
                    self.mark_l2(true);
                    match serde_json::from_str::<Envelope<V>>(&raw) {
                        Ok(envelope) => match envelope.remaining(now_ms()) {
                            Some(remaining) => {
                                let ttl = remaining.min(self.settings.ttl());
                                self.l1.insert(key, envelope.value.clone(), ttl, &[tenant]);
                                self.hits.fetch_add(1, Ordering::Relaxed);
                                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                                return Some(envelope.value);
                            }
                            None => debug!("shared cache entry past its lifetime"),
                        },
                        Err(e) => warn!(error = %e, "discarding undecodable shared cache entry"),
                    }
                }
                Ok(None) => self.mark_l2(true),
                Err(e) => { debug!(error = %e, "shared cache get failed"); self.mark_l2(false); }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write-through to both levels. `ttl` overrides the configured lifetime.
    pub async fn set(&self, query: &str, tenant: &str, modifiers: &[String], value: &V, ttl: Option<Duration>) {
        let key = self.key(query, tenant, modifiers);
        let ttl = ttl.unwrap_or_else(|| self.settings.ttl());
        if let Some(evicted) = self.l1.insert(key.clone(), value.clone(), ttl, &[tenant]) {
            debug!(evicted = %evicted, "l1 eviction");
        }
        let Some(l2) = &self.l2 else { return };
        let envelope = Envelope { value, created_at_ms: now_ms(), ttl_ms: ttl.as_millis() as u64 };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => { warn!(error = %e, "cache value not serializable, skipping shared level"); return; }
        };
        match with_timeout(self.settings.l2_timeout(), l2.set(&key, raw, ttl)).await {
            Ok(()) => self.mark_l2(true),
            Err(e) => { debug!(error = %e, "shared cache set failed"); self.mark_l2(false); }
        }
    }

    /// Purge every entry derived for `tenant`.
    ///
    /// L1 is purged completely. The L2 purge is best effort: it visits at most
    /// `scan_cap` keys, so a tenant with more shared entries than that is not
    /// guaranteed to be fully purged (see [`InvalidationReport::l2_complete`]).
    pub async fn invalidate_tenant(&self, tenant: &str) -> InvalidationReport {
        let l1_removed = self.l1.remove_tagged(tenant);
        let mut report = InvalidationReport { l1_removed, l2_removed: 0, l2_complete: true };
        let Some(l2) = &self.l2 else { return report };
        let cap = self.settings.scan_cap;
        let pattern = tenant_scan_pattern(&self.settings.namespace, tenant);
        match with_timeout(self.settings.l2_timeout(), l2.scan_by_pattern(&pattern, cap)).await {
            Ok(keys) => {
                self.mark_l2(true);
                report.l2_complete = keys.len() < cap;
                for key in keys {
                    match with_timeout(self.settings.l2_timeout(), l2.delete(&key)).await {
                        Ok(true) => report.l2_removed += 1,
                        Ok(false) => {}
                        Err(e) => { warn!(error = %e, "shared cache delete failed"); report.l2_complete = false; self.mark_l2(false); break; }
                    }
                }
            }
            Err(e) => { warn!(error = %e, "shared cache scan failed"); report.l2_complete = false; self.mark_l2(false); }
        }
        debug!(tenant = %tenant, ?report, "tenant invalidated");
        report
    }

    pub async fn clear_all(&self) {
        self.l1.clear();
        if let Some(l2) = &self.l2 {
            match with_timeout(self.settings.l2_timeout(), l2.clear()).await {
                Ok(()) => self.mark_l2(true),
                Err(e) => { warn!(error = %e, "shared cache clear failed"); self.mark_l2(false); }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            l1_size: self.l1.len(),
            l1_capacity: self.l1.capacity(),
            l2_configured: self.l2.is_some(),
            l2_reachable: self.l2.is_some() && self.l2_reachable.load(Ordering::SeqCst),
        }
    }
}
