//! Memoization statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how a memoizer's calls were served
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Calls answered from the active scope
    hits: AtomicU64,
    /// Calls that computed and stored a fresh result
    misses: AtomicU64,
    /// Calls computed directly because no usable scope was active
    bypasses: AtomicU64,
    /// Calls computed directly because the cache key could not be derived
    key_failures: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_key_failure(&self) {
        self.key_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn bypasses(&self) -> u64 {
        self.bypasses.load(Ordering::Relaxed)
    }

    pub fn key_failures(&self) -> u64 {
        self.key_failures.load(Ordering::Relaxed)
    }

    /// Calculate hit rate over cache lookups (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Every call, whether or not the cache was consulted
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses() + self.bypasses() + self.key_failures()
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.bypasses.store(0, Ordering::Relaxed);
        self.key_failures.store(0, Ordering::Relaxed);
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            bypasses: AtomicU64::new(self.bypasses()),
            key_failures: AtomicU64::new(self.key_failures()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_recording() {
        let stats = CacheStats::new();

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_bypass();
        stats.record_key_failure();

        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.total_requests(), 5);
    }

    #[test]
    fn test_hit_rate_ignores_bypasses() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        stats.record_miss();
        stats.record_bypass();
        stats.record_bypass();

        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_and_clone() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();

        let cloned = stats.clone();
        stats.reset();

        assert_eq!(stats.total_requests(), 0);
        assert_eq!(cloned.hits(), 1);
        assert_eq!(cloned.misses(), 1);
    }
}
