use std::sync::atomic::{AtomicU64, Ordering};

/// Hot-path counters. Plain relaxed atomics; an exporter (out of scope)
/// would read `snapshot()`.
#[derive(Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub stale_hits: AtomicU64,
    pub evictions: AtomicU64,
    pub stale_writes_dropped: AtomicU64,
    pub expiry_events_dropped: AtomicU64,
    pub refresh_events_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub evictions: u64,
    pub stale_writes_dropped: u64,
    pub expiry_events_dropped: u64,
    pub refresh_events_dropped: u64,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_writes_dropped: self.stale_writes_dropped.load(Ordering::Relaxed),
            expiry_events_dropped: self.expiry_events_dropped.load(Ordering::Relaxed),
            refresh_events_dropped: self.refresh_events_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let total = hits + self.misses.load(Ordering::Relaxed) as f64;
        if total > 0.0 {
            hits / total * 100.0
        } else {
            0.0
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stale_hits.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.stale_writes_dropped.store(0, Ordering::Relaxed);
        self.expiry_events_dropped.store(0, Ordering::Relaxed);
        self.refresh_events_dropped.store(0, Ordering::Relaxed);
    }
}
