use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::core::constants::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::core::geo::LatLngBounds;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Fetch results keyed by bounding box, with LRU eviction and expiry.
///
/// The entry count never exceeds the capacity given at construction.
#[derive(Debug)]
pub struct BoundsCache<V> {
    cache: Arc<Mutex<LruCache<String, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<V: Clone> BoundsCache<V> {
    /// Create a new cache holding at most `capacity` boxes for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        }
    }

    /// Create a new cache with the default capacity and TTL
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    /// Get a fresh entry, evicting it if it has expired
    pub fn get(&self, bounds: &LatLngBounds) -> Option<V> {
        let key = bounds.cache_key();
        let mut cache = self.cache.lock().ok()?;
        let expired = cache.peek(&key)?.inserted_at.elapsed() > self.ttl;
        if expired {
            cache.pop(&key);
            return None;
        }
        cache.get(&key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, bounds: &LatLngBounds, value: V) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                bounds.cache_key(),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let Ok(mut cache) = self.cache.lock() else {
            return 0;
        };
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn contains(&self, bounds: &LatLngBounds) -> bool {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.contains(&bounds.cache_key()))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().ok().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .ok()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }
}

impl<V> Clone for BoundsCache<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
        }
    }
}

impl<V: Clone> Default for BoundsCache<V> {
    fn default() -> Self {
        Self::with_defaults()
    }
}
