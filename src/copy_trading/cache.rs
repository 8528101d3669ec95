// =============================================================================
// Trader Cache — address-keyed LRU with TTL
// =============================================================================
//
// Caches per-wallet analytics so the ranker and pollers do not refetch on
// every cycle. Capacity-bound (least-recently-used eviction) and TTL-bound;
// `evict_expired` runs from a periodic task.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::clock::SharedClock;
use crate::copy_trading::ranker::TraderStats;

/// Default capacity.
const DEFAULT_CAPACITY: usize = 500;
/// Default entry lifetime.
const DEFAULT_TTL_MS: u64 = 3_600_000;

struct CacheEntry {
    stats: TraderStats,
    inserted_at_ms: u64,
    last_access_ms: u64,
}

pub struct TraderCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: SharedClock,
    capacity: usize,
    ttl_ms: u64,
}

impl TraderCache {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_limits(clock, DEFAULT_CAPACITY, DEFAULT_TTL_MS)
    }

    pub fn with_limits(clock: SharedClock, capacity: usize, ttl_ms: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            capacity,
            ttl_ms,
        }
    }

    /// Insert or replace; evicts the least-recently-used entry past capacity.
    pub fn set(&self, address: &str, stats: TraderStats) {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write();
        entries.insert(
            address.to_string(),
            CacheEntry {
                stats,
                inserted_at_ms: now,
                last_access_ms: now,
            },
        );

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_ms)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Fetch if present and inside the TTL; refreshes recency.
    pub fn get(&self, address: &str) -> Option<TraderStats> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write();
        let expired = match entries.get(address) {
            Some(entry) => now.saturating_sub(entry.inserted_at_ms) >= self.ttl_ms,
            None => return None,
        };
        if expired {
            entries.remove(address);
            return None;
        }
        let entry = entries.get_mut(address)?;
        entry.last_access_ms = now;
        Some(entry.stats.clone())
    }

    /// Drop every entry past the TTL. Returns how many went.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| now.saturating_sub(e.inserted_at_ms) < self.ttl_ms);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn stats(address: &str, roi: f64) -> TraderStats {
        TraderStats {
            address: address.into(),
            roi,
            win_rate: 0.6,
            profit_factor: 1.5,
            sharpe: 1.0,
            max_drawdown: 0.2,
            trade_count: 50,
            total_volume_usd: 10_000.0,
        }
    }

    fn cache(capacity: usize, ttl_ms: u64) -> (Arc<ManualClock>, TraderCache) {
        let clock = Arc::new(ManualClock::new());
        let cache = TraderCache::with_limits(clock.clone() as SharedClock, capacity, ttl_ms);
        (clock, cache)
    }

    #[test]
    fn set_then_get_roundtrips_until_ttl() {
        let (clock, cache) = cache(10, 3_600_000);
        cache.set("0xa", stats("0xa", 0.4));
        assert_eq!(cache.get("0xa").unwrap().roi, 0.4);

        clock.advance_ms(3_599_999);
        assert!(cache.get("0xa").is_some());

        clock.advance_ms(1);
        assert!(cache.get("0xa").is_none());
    }

    #[test]
    fn lru_eviction_past_capacity() {
        let (clock, cache) = cache(2, 3_600_000);
        cache.set("0xa", stats("0xa", 0.1));
        clock.advance_ms(10);
        cache.set("0xb", stats("0xb", 0.2));
        clock.advance_ms(10);
        // Touch 0xa so 0xb becomes the least recently used.
        cache.get("0xa");
        clock.advance_ms(10);
        cache.set("0xc", stats("0xc", 0.3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("0xa").is_some());
        assert!(cache.get("0xb").is_none());
        assert!(cache.get("0xc").is_some());
    }

    #[test]
    fn evict_expired_sweeps_in_bulk() {
        let (clock, cache) = cache(10, 1_000);
        cache.set("0xa", stats("0xa", 0.1));
        cache.set("0xb", stats("0xb", 0.2));
        clock.advance_ms(500);
        cache.set("0xc", stats("0xc", 0.3));
        clock.advance_ms(600);

        // a and b are past the 1 s TTL; c is not.
        assert_eq!(cache.evict_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("0xc").is_some());
    }

    #[test]
    fn overwrite_refreshes_ttl() {
        let (clock, cache) = cache(10, 1_000);
        cache.set("0xa", stats("0xa", 0.1));
        clock.advance_ms(900);
        cache.set("0xa", stats("0xa", 0.5));
        clock.advance_ms(900);
        assert_eq!(cache.get("0xa").unwrap().roi, 0.5);
    }
}
