//! Shared scenario counters

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide counters written by the lock-order and retry-storm engines.
///
/// Cache counters are not stored here; they are owned by the cache engine
/// and read under its own lock when a snapshot is taken.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    successful_orders: AtomicU64,
    deadlock_detections: AtomicU64,
    abandoned_workers: AtomicU64,
    pending_calls: AtomicI64,
    failed_calls: AtomicU64,
    timed_out_calls: AtomicU64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_successful_order(&self) {
        self.successful_orders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadlock_detection(&self, abandoned: u64) {
        self.deadlock_detections.fetch_add(1, Ordering::Relaxed);
        self.abandoned_workers.fetch_add(abandoned, Ordering::Relaxed);
    }

    pub fn call_started(&self) {
        self.pending_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_finished(&self) {
        self.pending_calls.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_failed_call(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out_call(&self) {
        self.timed_out_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lock_order(&self) -> LockOrderStats {
        LockOrderStats {
            successful_orders: self.successful_orders.load(Ordering::Relaxed),
            deadlock_detections: self.deadlock_detections.load(Ordering::Relaxed),
            abandoned_workers: self.abandoned_workers.load(Ordering::Relaxed),
        }
    }

    pub fn retry_storm(&self) -> RetryStormStats {
        RetryStormStats {
            pending: self.pending_calls.load(Ordering::Relaxed),
            failed: self.failed_calls.load(Ordering::Relaxed),
            timeouts: self.timed_out_calls.load(Ordering::Relaxed),
        }
    }
}

/// Counters of the deadlock scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOrderStats {
    pub successful_orders: u64,
    pub deadlock_detections: u64,
    /// Workers left blocked across all detections
    pub abandoned_workers: u64,
}

/// Counters of the retry-storm scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStormStats {
    /// Logical fetches currently in flight
    pub pending: i64,
    /// Attempts that ended in a non-timeout error
    pub failed: u64,
    /// Attempts that hit the per-attempt deadline
    pub timeouts: u64,
}

/// Counters of the memory-leak scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub bytes: u64,
}

/// Unified view over all three scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStats {
    pub cache_entries: u64,
    pub cache_bytes: u64,
    pub successful_orders: u64,
    pub deadlock_detections: u64,
    pub abandoned_workers: u64,
    pub pending_calls: i64,
    pub failed_calls: u64,
    pub timed_out_calls: u64,
}

impl ScenarioStats {
    pub fn merge(cache: CacheStats, lock_order: LockOrderStats, retry: RetryStormStats) -> Self {
        Self {
            cache_entries: cache.entries,
            cache_bytes: cache.bytes,
            successful_orders: lock_order.successful_orders,
            deadlock_detections: lock_order.deadlock_detections,
            abandoned_workers: lock_order.abandoned_workers,
            pending_calls: retry.pending,
            failed_calls: retry.failed,
            timed_out_calls: retry.timeouts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_calls_balance() {
        let stats = StatsAggregator::new();
        stats.call_started();
        stats.call_started();
        stats.call_finished();
        assert_eq!(stats.retry_storm().pending, 1);
        stats.call_finished();
        assert_eq!(stats.retry_storm().pending, 0);
    }

    #[test]
    fn test_deadlock_detection_accumulates_abandoned_workers() {
        let stats = StatsAggregator::new();
        stats.record_deadlock_detection(4);
        stats.record_deadlock_detection(6);

        let lock = stats.lock_order();
        assert_eq!(lock.deadlock_detections, 2);
        assert_eq!(lock.abandoned_workers, 10);
        assert_eq!(lock.successful_orders, 0);
    }

    #[test]
    fn test_merge_maps_every_field() {
        let merged = ScenarioStats::merge(
            CacheStats {
                entries: 2,
                bytes: 20,
            },
            LockOrderStats {
                successful_orders: 3,
                deadlock_detections: 1,
                abandoned_workers: 5,
            },
            RetryStormStats {
                pending: 0,
                failed: 7,
                timeouts: 9,
            },
        );

        assert_eq!(merged.cache_entries, 2);
        assert_eq!(merged.cache_bytes, 20);
        assert_eq!(merged.successful_orders, 3);
        assert_eq!(merged.deadlock_detections, 1);
        assert_eq!(merged.abandoned_workers, 5);
        assert_eq!(merged.pending_calls, 0);
        assert_eq!(merged.failed_calls, 7);
        assert_eq!(merged.timed_out_calls, 9);
    }
}
