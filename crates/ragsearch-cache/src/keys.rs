//! Cache key builders.
//!
//! Each cache has its own named builder taking typed parameters, so keys do
//! not depend on call-site argument order. All digests are blake3 hex.

/// Lowercase and collapse runs of whitespace.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Fixed-length segment identifying a tenant inside shared keys.
pub fn tenant_segment(tenant: &str) -> String {
    digest(&["tenant", tenant])[..16].to_string()
}

/// `{namespace}:search:{tenant}:{digest}` where the digest covers the
/// normalized query, the tenant and the sorted, de-duplicated modifiers.
pub fn query_cache_key(namespace: &str, tenant: &str, query: &str, modifiers: &[String]) -> String {
    let mut mods: Vec<&str> = modifiers.iter().map(String::as_str).collect();
    mods.sort_unstable();
    mods.dedup();
    let normalized = normalize_query(query);
    let mut parts = vec!["search", tenant, normalized.as_str()];
    parts.extend(mods);
    format!("{}:search:{}:{}", namespace, tenant_segment(tenant), digest(&parts))
}

/// Pattern matching every query-cache key of `tenant`.
pub fn tenant_scan_pattern(namespace: &str, tenant: &str) -> String {
    format!("{}:search:{}:*", namespace, tenant_segment(tenant))
}

pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}:*", namespace)
}

pub fn hyde_document_key(query: &str) -> String {
    digest(&["hyde", &normalize_query(query)])
}

/// Keyed on the exact text so identical hypothetical answers share one
/// embedding.
pub fn embedding_key(text: &str) -> String {
    digest(&["embedding", text])
}

pub fn decomposition_key(query: &str) -> String {
    digest(&["decomposition", &normalize_query(query)])
}
