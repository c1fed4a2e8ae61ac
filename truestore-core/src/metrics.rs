//! # Tier Statistics
//!
//! Each tier owns a [`TierMetrics`] block of atomic counters and hands out
//! plain [`TierStats`] snapshots; callers never hold a live handle.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of one tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_count: usize,
    pub current_size_bytes: u64,
}

impl TierStats {
    /// Hits over lookups, 0.0 when nothing was looked up yet
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Field-wise sum of two snapshots
    pub fn merge(&self, other: &TierStats) -> TierStats {
        TierStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            evictions: self.evictions + other.evictions,
            current_count: self.current_count + other.current_count,
            current_size_bytes: self.current_size_bytes + other.current_size_bytes,
        }
    }
}

/// Combined view returned by the mixed tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MixedStats {
    pub hot: TierStats,
    pub cold: TierStats,
    /// Mixed-level lookups answered by the hot tier
    pub hot_hits: u64,
    /// Mixed-level lookups answered by the cold tier
    pub cold_hits: u64,
    /// Mixed-level lookups answered by neither
    pub misses: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub hot_hit_ratio: f64,
}

impl MixedStats {
    /// Both tiers folded into one snapshot
    pub fn combined(&self) -> TierStats {
        TierStats {
            hits: self.hot_hits + self.cold_hits,
            misses: self.misses,
            evictions: self.hot.evictions + self.cold.evictions,
            current_count: self.hot.current_count + self.cold.current_count,
            current_size_bytes: self.hot.current_size_bytes + self.cold.current_size_bytes,
        }
    }
}

/// Hit/miss/eviction counters owned by a tier
#[derive(Debug, Default)]
pub struct TierMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TierMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Snapshot with the tier's current occupancy filled in
    pub fn snapshot(&self, current_count: usize, current_size_bytes: u64) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            current_count,
            current_size_bytes,
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = TierMetrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_evictions(3);

        let stats = metrics.snapshot(7, 1024);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.current_count, 7);
        assert_eq!(stats.current_size_bytes, 1024);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);

        metrics.reset();
        assert_eq!(metrics.snapshot(0, 0), TierStats::default());
    }

    #[test]
    fn test_hit_rate_without_lookups() {
        assert_eq!(TierStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_merge() {
        let a = TierStats { hits: 1, misses: 2, evictions: 3, current_count: 4, current_size_bytes: 5 };
        let b = TierStats { hits: 10, misses: 20, evictions: 30, current_count: 40, current_size_bytes: 50 };
        let merged = a.merge(&b);
        assert_eq!(merged.hits, 11);
        assert_eq!(merged.current_size_bytes, 55);
    }
}
