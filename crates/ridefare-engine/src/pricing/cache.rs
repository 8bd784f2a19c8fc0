//! Resolved pricing cache
//!
//! Read-through cache of folded hierarchies keyed by version, scope and ride
//! type. Keys carry the version id, so entries of a superseded version can
//! never answer for its successor; the cache is still cleared on every
//! version transition to release them.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use ridefare_common::{GeoLocation, ResolvedPricing, Scope};

/// Cache key components
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub version_id: i64,
    pub scope: Scope,
    pub ride_type_id: Option<i64>,
}

impl CacheKey {
    pub fn new(version_id: i64, location: &GeoLocation, ride_type_id: Option<i64>) -> Self {
        Self {
            version_id,
            scope: Scope::of_location(location),
            ride_type_id,
        }
    }
}

/// In-memory cache using DashMap
pub struct ResolvedPricingCache {
    cache: DashMap<CacheKey, ResolvedPricing>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolvedPricingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: DashMap::new(),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolvedPricing> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: CacheKey, pricing: ResolvedPricing) {
        if self.max_entries == 0 {
            return;
        }
        // Evict entries of other versions first, then an arbitrary one
        if self.cache.len() >= self.max_entries {
            self.cache.retain(|k, _| k.version_id == key.version_id);

            if self.cache.len() >= self.max_entries {
                // Release the shard guard before removing
                let victim = self.cache.iter().next().map(|e| *e.key());
                if let Some(victim) = victim {
                    self.cache.remove(&victim);
                }
            }
        }

        self.cache.insert(key, pricing);
    }

    /// Drop every entry; returns how many were removed
    pub fn invalidate_all(&self) -> usize {
        let removed = self.cache.len();
        self.cache.clear();
        debug!(removed, "Cleared resolved pricing cache");
        removed
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.cache.len() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entry_count: u64,
    pub hits: u64,
    pub misses: u64,
}
