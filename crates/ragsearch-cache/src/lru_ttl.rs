use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

struct Slot<V> {
    value: V,
    expires_at: Instant,
    tags: Vec<String>,
}

/// Bounded, process-local LRU whose entries each carry their own deadline.
///
/// All mutations go through one mutex, held only for in-memory work.
pub struct TtlLru<V> {
    inner: Mutex<LruCache<String, Slot<V>>>,
    capacity: usize,
}

impl<V: Clone> TtlLru<V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(cap)), capacity: cap.get() }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn len(&self) -> usize { self.inner.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Live value for `key`, promoting it to most recently used. Expired
    /// entries are dropped on sight.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let expired = match guard.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => return Some(slot.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired { guard.pop(key); }
        None
    }

    /// Insert with a fresh deadline. Returns the key evicted to make room, if any.
    pub fn insert(&self, key: String, value: V, ttl: Duration, tags: &[&str]) -> Option<String> {
        let slot = Slot { value, expires_at: Instant::now() + ttl, tags: tags.iter().map(|t| t.to_string()).collect() };
        let mut guard = self.inner.lock();
        match guard.push(key.clone(), slot) {
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().pop(key).is_some()
    }

    /// Drop every entry carrying `tag`. Returns how many were removed.
    pub fn remove_tagged(&self, tag: &str) -> usize {
        let mut guard = self.inner.lock();
        let doomed: Vec<String> = guard.iter().filter(|(_, slot)| slot.tags.iter().any(|t| t == tag)).map(|(k, _)| k.clone()).collect();
        for key in &doomed { guard.pop(key); }
        doomed.len()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
