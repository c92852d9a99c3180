//! In-memory index from source URL to hydrated handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::LocalHandle;

/// Process-local tier of the image cache.
///
/// Holds at most one handle per URL. Entries are never evicted implicitly;
/// they leave only through [`MemoryImageCache::drain`].
#[derive(Debug, Default)]
pub struct MemoryImageCache {
    entries: RwLock<HashMap<String, LocalHandle>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the handle for `url`, counting the hit or miss.
    pub fn get(&self, url: &str) -> Option<LocalHandle> {
        let handle = self.entries.read().get(url).cloned();
        if handle.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(url = %url, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(url = %url, "Memory cache miss");
        }
        handle
    }

    /// Looks up the handle for `url` without touching the statistics.
    pub fn peek(&self, url: &str) -> Option<LocalHandle> {
        self.entries.read().get(url).cloned()
    }

    /// Returns true if `url` has been hydrated.
    pub fn contains(&self, url: &str) -> bool {
        self.entries.read().contains_key(url)
    }

    /// Installs `handle` for `url` unless one is already present.
    ///
    /// Returns the handle that ends up in the index. When it differs from
    /// `handle`, the caller still owns `handle` and must release it.
    pub fn insert_if_absent(&self, url: &str, handle: LocalHandle) -> LocalHandle {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(url) {
            trace!(url = %url, "Memory cache already hydrated");
            return existing.clone();
        }
        debug!(url = %url, handle = %handle, "Storing handle in memory cache");
        entries.insert(url.to_string(), handle.clone());
        handle
    }

    /// Empties the index, handing every entry back to the caller.
    pub fn drain(&self) -> Vec<(String, LocalHandle)> {
        let mut entries = self.entries.write();
        let drained: Vec<_> = entries.drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cleared memory image cache");
        }
        drained
    }

    /// Returns the number of hydrated URLs.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing has been hydrated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: self.len(),
        }
    }
}

/// Statistics about memory tier performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of hydrated URLs.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Memory: {} images, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = MemoryImageCache::new();
        let handle = LocalHandle::generate();

        let installed = cache.insert_if_absent("https://x/a.jpg", handle.clone());

        assert_eq!(installed, handle);
        assert_eq!(cache.get("https://x/a.jpg"), Some(handle));
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new();
        assert!(cache.get("https://x/nonexistent.jpg").is_none());
        assert!(!cache.contains("https://x/nonexistent.jpg"));
    }

    #[test]
    fn test_first_handle_wins() {
        let cache = MemoryImageCache::new();
        let first = LocalHandle::generate();
        let second = LocalHandle::generate();

        cache.insert_if_absent("https://x/a.jpg", first.clone());
        let installed = cache.insert_if_absent("https://x/a.jpg", second);

        assert_eq!(installed, first);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_drain_empties_index() {
        let cache = MemoryImageCache::new();
        cache.insert_if_absent("https://x/a.jpg", LocalHandle::generate());
        cache.insert_if_absent("https://x/b.jpg", LocalHandle::generate());

        let drained = cache.drain();

        assert_eq!(drained.len(), 2);
        assert!(cache.is_empty());
        assert!(cache.peek("https://x/a.jpg").is_none());
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new();
        cache.insert_if_absent("https://x/a.jpg", LocalHandle::generate());

        // Hit
        let _ = cache.get("https://x/a.jpg");
        // Miss
        let _ = cache.get("https://x/missing.jpg");
        // Peek is not counted
        let _ = cache.peek("https://x/a.jpg");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }
}
