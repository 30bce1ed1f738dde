use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragsearch_cache::keys::{normalize_query, query_cache_key, tenant_scan_pattern};
use ragsearch_cache::memory::pattern_matches;
use ragsearch_cache::{MemoryTtlStore, QueryCache, TtlLru};
use ragsearch_core::config::CacheSettings;
use ragsearch_core::traits::{BackendResult, CacheStore};
use ragsearch_core::BackendError;

fn settings(capacity: usize) -> CacheSettings {
    CacheSettings { l1_capacity: capacity, ..CacheSettings::default() }
}

fn mods(top_k: &str) -> Vec<String> {
    vec![format!("top_k={top_k}")]
}

struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    async fn get(&self, _key: &str) -> BackendResult<Option<String>> { Err(BackendError::Unavailable("refused".into())) }
    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> BackendResult<()> { Err(BackendError::Unavailable("refused".into())) }
    async fn delete(&self, _key: &str) -> BackendResult<bool> { Err(BackendError::Unavailable("refused".into())) }
    async fn scan_by_pattern(&self, _pattern: &str, _cap: usize) -> BackendResult<Vec<String>> { Err(BackendError::Unavailable("refused".into())) }
    async fn clear(&self) -> BackendResult<()> { Err(BackendError::Unavailable("refused".into())) }
    async fn ping(&self) -> BackendResult<()> { Err(BackendError::Unavailable("refused".into())) }
}

struct HangingStore;

#[async_trait]
impl CacheStore for HangingStore {
    async fn get(&self, _key: &str) -> BackendResult<Option<String>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }
    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> BackendResult<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
    async fn delete(&self, _key: &str) -> BackendResult<bool> { Ok(false) }
    async fn scan_by_pattern(&self, _pattern: &str, _cap: usize) -> BackendResult<Vec<String>> { Ok(vec![]) }
    async fn clear(&self) -> BackendResult<()> { Ok(()) }
    async fn ping(&self) -> BackendResult<()> { Ok(()) }
}

#[test]
fn keys_ignore_case_and_whitespace() {
    assert_eq!(normalize_query("  What  is\tRust "), "what is rust");
    let a = query_cache_key("ns", "t1", "What is Rust", &mods("10"));
    let b = query_cache_key("ns", "t1", "  what   is rust", &mods("10"));
    assert_eq!(a, b);
}

#[test]
fn keys_differ_by_tenant_and_modifiers() {
    let base = query_cache_key("ns", "t1", "q", &mods("10"));
    assert_ne!(base, query_cache_key("ns", "t2", "q", &mods("10")));
    assert_ne!(base, query_cache_key("ns", "t1", "q", &mods("5")));
    let ab = query_cache_key("ns", "t1", "q", &["a".to_string(), "b".to_string()]);
    let ba = query_cache_key("ns", "t1", "q", &["b".to_string(), "a".to_string()]);
    assert_eq!(ab, ba);
}

#[test]
fn tenant_pattern_covers_only_that_tenant() {
    let p = tenant_scan_pattern("ns", "t1");
    assert!(pattern_matches(&p, &query_cache_key("ns", "t1", "anything", &[])));
    assert!(!pattern_matches(&p, &query_cache_key("ns", "t2", "anything", &[])));
    assert!(pattern_matches("exact", "exact"));
    assert!(!pattern_matches("exact", "exactly"));
}

#[test]
fn lru_evicts_least_recently_used() {
    let lru: TtlLru<u32> = TtlLru::new(2);
    let ttl = Duration::from_secs(60);
    assert!(lru.insert("a".into(), 1, ttl, &[]).is_none());
    assert!(lru.insert("b".into(), 2, ttl, &[]).is_none());
    assert_eq!(lru.get("a"), Some(1));
    assert_eq!(lru.insert("c".into(), 3, ttl, &[]), Some("b".to_string()));
    assert_eq!(lru.get("b"), None);
    assert_eq!(lru.len(), 2);
    // overwriting an existing key is not an eviction
    assert!(lru.insert("c".into(), 4, ttl, &[]).is_none());
    assert_eq!(lru.get("c"), Some(4));
}

#[test]
fn lru_entries_expire() {
    let lru: TtlLru<u32> = TtlLru::new(4);
    lru.insert("short".into(), 1, Duration::from_millis(20), &[]);
    lru.insert("long".into(), 2, Duration::from_secs(60), &[]);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(lru.get("short"), None);
    assert_eq!(lru.get("long"), Some(2));
    assert_eq!(lru.len(), 1);
}

#[tokio::test]
async fn hit_after_set_and_counters() {
    let cache: QueryCache<Vec<String>> = QueryCache::new(settings(8), None);
    assert_eq!(cache.stats().hit_rate, 0.0);
    assert!(cache.get("q", "t1", &mods("10")).await.is_none());
    cache.set("q", "t1", &mods("10"), &vec!["x".to_string()], None).await;
    assert_eq!(cache.get("Q ", "t1", &mods("10")).await, Some(vec!["x".to_string()]));
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    assert_eq!(stats.l1_size, 1);
    assert!(!stats.l2_configured);
}

#[tokio::test]
async fn ttl_override_expires_entry() {
    let cache: QueryCache<u32> = QueryCache::new(settings(8), None);
    cache.set("q", "t1", &[], &7, Some(Duration::from_millis(20))).await;
    assert_eq!(cache.get("q", "t1", &[]).await, Some(7));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.get("q", "t1", &[]).await, None);
}

#[tokio::test]
async fn tenants_are_isolated() {
    let cache: QueryCache<u32> = QueryCache::new(settings(8), None);
    cache.set("q", "t1", &[], &1, None).await;
    assert_eq!(cache.get("q", "t2", &[]).await, None);
    assert_eq!(cache.get("q", "t1", &[]).await, Some(1));
}

#[tokio::test]
async fn invalidate_tenant_leaves_others() {
    let shared = Arc::new(MemoryTtlStore::new());
    let cache: QueryCache<u32> = QueryCache::new(settings(8), Some(shared.clone()));
    cache.set("q1", "t1", &[], &1, None).await;
    cache.set("q2", "t1", &[], &2, None).await;
    cache.set("q1", "t2", &[], &3, None).await;
    assert_eq!(shared.len(), 3);

    let report = cache.invalidate_tenant("t1").await;
    assert_eq!(report.l1_removed, 2);
    assert_eq!(report.l2_removed, 2);
    assert!(report.l2_complete);

    assert_eq!(cache.get("q1", "t1", &[]).await, None);
    assert_eq!(cache.get("q1", "t2", &[]).await, Some(3));
    assert_eq!(shared.len(), 1);
}

#[tokio::test]
async fn capped_scan_reports_incomplete_purge() {
    let shared = Arc::new(MemoryTtlStore::new());
    let cfg = CacheSettings { scan_cap: 2, ..settings(8) };
    let cache: QueryCache<u32> = QueryCache::new(cfg, Some(shared.clone()));
    for i in 0..3 {
        cache.set(&format!("q{i}"), "t1", &[], &i, None).await;
    }
    let report = cache.invalidate_tenant("t1").await;
    assert_eq!(report.l2_removed, 2);
    assert!(!report.l2_complete);
    assert_eq!(shared.len(), 1);
}

#[tokio::test]
async fn shared_level_backfills_second_instance() {
    let shared: Arc<MemoryTtlStore> = Arc::new(MemoryTtlStore::new());
    let writer: QueryCache<String> = QueryCache::new(settings(8), Some(shared.clone()));
    let reader: QueryCache<String> = QueryCache::new(settings(8), Some(shared.clone()));
    writer.set("q", "t1", &mods("5"), &"answer".to_string(), None).await;

    assert_eq!(reader.stats().l1_size, 0);
    assert_eq!(reader.get("q", "t1", &mods("5")).await.as_deref(), Some("answer"));
    let stats = reader.stats();
    assert_eq!(stats.l2_hits, 1);
    assert_eq!(stats.l1_size, 1);
    assert!(stats.l2_reachable);
}

#[tokio::test]
async fn backfilled_entry_expires_with_its_shared_original() {
    let shared: Arc<MemoryTtlStore> = Arc::new(MemoryTtlStore::new());
    let writer: QueryCache<u32> = QueryCache::new(settings(8), Some(shared.clone()));
    let reader: QueryCache<u32> = QueryCache::new(settings(8), Some(shared.clone()));
    writer.set("q", "t1", &[], &7, Some(Duration::from_millis(100))).await;

    assert_eq!(reader.get("q", "t1", &[]).await, Some(7));
    assert_eq!(reader.stats().l1_size, 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(reader.get("q", "t1", &[]).await, None);
    assert_eq!(writer.get("q", "t1", &[]).await, None);
}

#[tokio::test]
async fn l1_eviction_keeps_value_in_shared_level() {
    let shared = Arc::new(MemoryTtlStore::new());
    let cache: QueryCache<u32> = QueryCache::new(settings(1), Some(shared.clone()));
    cache.set("a", "t1", &[], &1, None).await;
    cache.set("b", "t1", &[], &2, None).await;
    assert_eq!(cache.stats().l1_size, 1);
    assert_eq!(cache.get("a", "t1", &[]).await, Some(1));
    assert_eq!(cache.stats().l2_hits, 1);
}

#[tokio::test]
async fn unreachable_shared_level_degrades_to_local() {
    let cache: QueryCache<u32> = QueryCache::new(settings(8), Some(Arc::new(DownStore)));
    cache.set("q", "t1", &[], &9, None).await;
    assert_eq!(cache.get("q", "t1", &[]).await, Some(9));
    assert_eq!(cache.get("other", "t1", &[]).await, None);
    let stats = cache.stats();
    assert!(stats.l2_configured);
    assert!(!stats.l2_reachable);

    let report = cache.invalidate_tenant("t1").await;
    assert_eq!(report.l1_removed, 1);
    assert!(!report.l2_complete);
}

#[tokio::test]
async fn slow_shared_level_times_out() {
    let cfg = CacheSettings { l2_timeout_ms: 20, ..settings(8) };
    let cache: QueryCache<u32> = QueryCache::new(cfg, Some(Arc::new(HangingStore)));
    let started = std::time::Instant::now();
    assert_eq!(cache.get("q", "t1", &[]).await, None);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!cache.stats().l2_reachable);
}

#[tokio::test]
async fn clear_all_empties_both_levels() {
    let shared = Arc::new(MemoryTtlStore::new());
    let cache: QueryCache<u32> = QueryCache::new(settings(8), Some(shared.clone()));
    cache.set("q", "t1", &[], &1, None).await;
    cache.set("q", "t2", &[], &2, None).await;
    cache.clear_all().await;
    assert!(shared.is_empty());
    assert_eq!(cache.stats().l1_size, 0);
    assert_eq!(cache.get("q", "t1", &[]).await, None);
}

#[tokio::test]
async fn memory_store_expires_lazily() {
    let store = MemoryTtlStore::new();
    store.set("k", "v".into(), Duration::from_millis(20)).await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get("k").await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_keep_counters_and_capacity_consistent() {
    const TASKS: u32 = 32;
    const ROUNDS: u32 = 50;
    let shared = Arc::new(MemoryTtlStore::new());
    let cache: Arc<QueryCache<u32>> = Arc::new(QueryCache::new(settings(16), Some(shared)));

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let tenant = format!("t{}", task % 4);
            for round in 0..ROUNDS {
                let query = format!("q{}", (task + round) % 24);
                cache.set(&query, &tenant, &[], &round, None).await;
                let _ = cache.get(&query, &tenant, &[]).await;
                if round % 17 == 0 {
                    cache.invalidate_tenant(&tenant).await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, u64::from(TASKS * ROUNDS));
    assert!(stats.l1_size <= stats.l1_capacity);
    assert!(stats.hits > 0);
}
