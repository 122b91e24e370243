//! Byte-budgeted LRU store.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

use super::stats::{CacheStats, Counters};
use super::FetchKey;
use crate::layer::LayerId;
use crate::source::Payload;

#[derive(Debug)]
struct Entry {
    payload: Arc<Payload>,
    size: usize,
    /// Recency stamp; larger is more recent.
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<FetchKey, Entry>,
    /// `tick -> key`, oldest first.
    recency: BTreeMap<u64, FetchKey>,
    next_tick: u64,
    size_bytes: usize,
}

impl Inner {
    fn stamp(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &FetchKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.size_bytes -= entry.size;
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<(FetchKey, Entry)> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;
        self.size_bytes -= entry.size;
        Some((key, entry))
    }
}

/// Least-recently-used cache of fetch payloads bounded by estimated bytes.
///
/// Payloads are shared as `Arc`s so a hit costs a reference count, not a
/// copy of the features.
#[derive(Debug)]
pub struct FetchCache {
    inner: Mutex<Inner>,
    budget_bytes: usize,
    counters: Counters,
}

impl FetchCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            budget_bytes,
            counters: Counters::default(),
        }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Look up a payload and mark it most recently used.
    pub fn get(&self, key: &FetchKey) -> Option<Arc<Payload>> {
        let hit = {
            let mut guard = self.inner.lock();
            let tick = guard.stamp();
            let inner = &mut *guard;
            match inner.entries.get_mut(key) {
                Some(entry) => {
                    let old = std::mem::replace(&mut entry.tick, tick);
                    inner.recency.remove(&old);
                    inner.recency.insert(tick, key.clone());
                    Some(Arc::clone(&entry.payload))
                }
                None => None,
            }
        };
        let counter = if hit.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        Counters::bump(counter, 1);
        hit
    }

    pub fn contains(&self, key: &FetchKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Store a payload, evicting the least recently used entries until it
    /// fits. Returns the shared payload; a payload larger than the whole
    /// budget is returned without being stored.
    pub fn insert(&self, key: FetchKey, payload: Payload) -> Arc<Payload> {
        let size = payload.estimated_size();
        let payload = Arc::new(payload);
        if size > self.budget_bytes {
            Counters::bump(&self.counters.rejected, 1);
            debug!(key = %key, size, budget = self.budget_bytes, "Payload exceeds cache budget, not cached");
            return payload;
        }

        let mut inner = self.inner.lock();
        inner.remove(&key);
        let mut evicted = 0u64;
        while inner.size_bytes + size > self.budget_bytes {
            match inner.pop_oldest() {
                Some((old, entry)) => {
                    trace!(key = %old, size = entry.size, "Evicted");
                    evicted += 1;
                }
                None => break,
            }
        }
        let tick = inner.stamp();
        inner.recency.insert(tick, key.clone());
        inner.size_bytes += size;
        inner.entries.insert(
            key,
            Entry {
                payload: Arc::clone(&payload),
                size,
                tick,
            },
        );
        let total = inner.size_bytes;
        drop(inner);

        Counters::bump(&self.counters.insertions, 1);
        if evicted > 0 {
            Counters::bump(&self.counters.evictions, evicted);
            debug!(evicted, size_bytes = total, budget = self.budget_bytes, "Cache eviction");
        }
        payload
    }

    /// Drop every entry of `layer`. Returns how many were removed.
    pub fn invalidate_layer(&self, layer: LayerId) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<FetchKey> = inner
            .entries
            .keys()
            .filter(|k| k.layer == layer)
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
        inner.size_bytes = 0;
    }

    /// Bytes held for `layer`.
    pub fn layer_usage(&self, layer: LayerId) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(k, _)| k.layer == layer)
            .map(|(_, e)| e.size)
            .sum()
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let (size_bytes, entry_count) = {
            let inner = self.inner.lock();
            (inner.size_bytes, inner.entries.len())
        };
        CacheStats {
            hits: Counters::read(&self.counters.hits),
            misses: Counters::read(&self.counters.misses),
            insertions: Counters::read(&self.counters.insertions),
            evictions: Counters::read(&self.counters.evictions),
            rejected: Counters::read(&self.counters.rejected),
            size_bytes,
            entry_count,
            budget_bytes: self.budget_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CrsId;
    use crate::geometry::BoundingBox;
    use crate::source::{FetchRequest, RasterTile};
    use image::RgbaImage;

    fn key(layer: u64, x: f64) -> FetchKey {
        let request = FetchRequest::new(
            BoundingBox::new(x, 0.0, x + 1.0, 1.0),
            CrsId::epsg(3857),
            1_000.0,
            64,
            64,
        );
        FetchKey::new(LayerId(layer), 1, &request)
    }

    /// Image payload of roughly `side * side * 4` bytes.
    fn tile(side: u32) -> Payload {
        Payload::Image(RasterTile::new(
            RgbaImage::new(side, side),
            BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            CrsId::epsg(3857),
        ))
    }

    #[test]
    fn test_hit_and_miss_counts() {
        let cache = FetchCache::new(1 << 20);
        assert!(cache.get(&key(1, 0.0)).is_none());
        cache.insert(key(1, 0.0), tile(8));
        assert!(cache.get(&key(1, 0.0)).is_some());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.insertions), (1, 1, 1));
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_eviction_respects_byte_budget() {
        let one = tile(32).estimated_size();
        let cache = FetchCache::new(one * 3);
        for i in 0..5 {
            cache.insert(key(1, i as f64), tile(32));
        }
        assert!(cache.size_bytes() <= cache.budget_bytes());
        assert_eq!(cache.entry_count(), 3);
        assert_eq!(cache.stats().evictions, 2);
        // Oldest two are gone.
        assert!(!cache.contains(&key(1, 0.0)));
        assert!(!cache.contains(&key(1, 1.0)));
        assert!(cache.contains(&key(1, 4.0)));
    }

    #[test]
    fn test_get_refreshes_recency() {
        let one = tile(32).estimated_size();
        let cache = FetchCache::new(one * 2);
        cache.insert(key(1, 0.0), tile(32));
        cache.insert(key(1, 1.0), tile(32));
        cache.get(&key(1, 0.0));
        cache.insert(key(1, 2.0), tile(32));

        assert!(cache.contains(&key(1, 0.0)));
        assert!(!cache.contains(&key(1, 1.0)));
    }

    #[test]
    fn test_large_entry_evicts_several_small_ones() {
        let small = tile(16).estimated_size();
        let large = tile(64).estimated_size();
        let cache = FetchCache::new(large + small);
        for i in 0..4 {
            cache.insert(key(1, i as f64), tile(16));
        }
        cache.insert(key(2, 0.0), tile(64));
        assert!(cache.size_bytes() <= cache.budget_bytes());
        assert!(cache.contains(&key(2, 0.0)));
        assert_eq!(cache.layer_usage(LayerId(2)), large);
    }

    #[test]
    fn test_oversized_payload_is_not_stored() {
        let cache = FetchCache::new(100);
        let payload = cache.insert(key(1, 0.0), tile(64));
        assert!(payload.image().is_some());
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.stats().rejected, 1);
    }

    #[test]
    fn test_reinsert_replaces_without_double_counting() {
        let cache = FetchCache::new(1 << 20);
        cache.insert(key(1, 0.0), tile(8));
        cache.insert(key(1, 0.0), tile(8));
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.size_bytes(), tile(8).estimated_size());
    }

    #[test]
    fn test_invalidate_layer() {
        let cache = FetchCache::new(1 << 20);
        cache.insert(key(1, 0.0), tile(8));
        cache.insert(key(1, 1.0), tile(8));
        cache.insert(key(2, 0.0), tile(8));

        assert_eq!(cache.invalidate_layer(LayerId(1)), 2);
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.layer_usage(LayerId(1)), 0);
        assert_eq!(cache.size_bytes(), tile(8).estimated_size());

        cache.clear();
        assert_eq!(cache.size_bytes(), 0);
    }
}
