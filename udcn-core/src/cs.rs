//! Content Store: Name -> (Content, insertion_time), exact-match
//! lookup, capacity-bounded with LRU eviction. Entries may also carry a
//! TTL; an entry can be evicted by either capacity pressure or TTL
//! expiry, whichever comes first. No two entries share a name.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use udcn_common::{Content, Name, UdcnMetrics};

struct CsEntry {
    content: Content,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Capacity-bounded, TTL-aware Content Store.
pub struct ContentStore {
    cache: LruCache<Name, CsEntry>,
    ttl: Duration,
}

impl ContentStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            cache: LruCache::new(capacity),
            ttl,
        }
    }

    /// Exact-match lookup. Promotes the entry in the LRU recency list on
    /// hit; returns `None` for an entry that has passed its TTL (the
    /// stale entry is also evicted).
    pub fn get(&mut self, name: &Name) -> Option<Content> {
        let expired = match self.cache.peek(name) {
            Some(entry) => Instant::now() >= entry.expires_at,
            None => return None,
        };
        if expired {
            self.cache.pop(name);
            return None;
        }
        self.cache.get(name).map(|entry| entry.content.clone())
    }

    /// Inserts `content`, evicting the least-recently-used entry if the
    /// store is at capacity. Inserting the same name twice leaves a
    /// single entry (the most recent), matching exact-match semantics.
    pub fn insert(&mut self, content: Content) -> Option<Name> {
        let now = Instant::now();
        let name = content.name.clone();
        let entry = CsEntry {
            content,
            inserted_at: now,
            expires_at: now + self.ttl,
        };
        self.cache
            .push(name, entry)
            .map(|(evicted_name, _)| evicted_name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.cache
            .peek(name)
            .map(|e| Instant::now() < e.expires_at)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evicts every entry past its TTL. Returns the evicted names.
    pub fn age(&mut self) -> Vec<Name> {
        let now = Instant::now();
        let expired: Vec<Name> = self
            .cache
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            self.cache.pop(name);
        }
        expired
    }

    /// Age (time since insertion) of the entry for `name`, if present.
    pub fn entry_age(&self, name: &Name) -> Option<Duration> {
        self.cache.peek(name).map(|e| e.inserted_at.elapsed())
    }

    pub fn record_metrics(&self, metrics: &UdcnMetrics) {
        metrics.cs_size.set(self.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn content(name: &str) -> Content {
        Content::new(Name::from_string(name), Bytes::from_static(b"x"))
    }

    #[test]
    fn exact_match_hit_and_miss() {
        let mut cs = ContentStore::new(4, Duration::from_secs(10));
        cs.insert(content("/a/b"));
        assert!(cs.get(&Name::from_string("/a/b")).is_some());
        assert!(cs.get(&Name::from_string("/a/c")).is_none());
    }

    #[test]
    fn inserting_same_name_twice_keeps_one_entry() {
        let mut cs = ContentStore::new(4, Duration::from_secs(10));
        cs.insert(content("/a/b"));
        cs.insert(content("/a/b"));
        assert_eq!(cs.len(), 1);
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let mut cs = ContentStore::new(2, Duration::from_secs(10));
        cs.insert(content("/a"));
        cs.insert(content("/b"));
        // Touch /a so /b becomes the least-recently-used entry.
        cs.get(&Name::from_string("/a"));
        cs.insert(content("/c"));
        assert!(cs.get(&Name::from_string("/b")).is_none());
        assert!(cs.get(&Name::from_string("/a")).is_some());
        assert!(cs.get(&Name::from_string("/c")).is_some());
    }

    #[test]
    fn ttl_expiry_independent_of_capacity() {
        let mut cs = ContentStore::new(4, Duration::from_millis(0));
        cs.insert(content("/a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cs.get(&Name::from_string("/a")).is_none());
    }

    #[test]
    fn age_evicts_expired_entries_only() {
        let mut cs = ContentStore::new(4, Duration::from_millis(0));
        cs.insert(content("/a"));
        std::thread::sleep(Duration::from_millis(5));
        let evicted = cs.age();
        assert_eq!(evicted, vec![Name::from_string("/a")]);
        assert!(cs.is_empty());
    }
}
