use super::storage::TieredCache;
use crate::dns::clock::unix_now_secs;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::time::{Duration, Instant};
use tracing::debug;

/// Observability record of the last reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub last_run_at_secs: u64,
    pub last_removed: usize,
    pub last_duration: Duration,
    pub heap_len: usize,
}

impl TieredCache {
    /// Pressure-driven reclamation over the expiry index.
    ///
    /// Policy, in order:
    /// - entries whose expiry is still ahead stop the pass (the heap is
    ///   expiry-ordered, so everything behind them is fresher);
    /// - stale indexes (entry gone, or live version differs) are discarded
    ///   with no cache mutation;
    /// - under high pressure every expired entry goes;
    /// - under low pressure with `keep_expired_entries`, nothing goes
    ///   (stale data stays servable);
    /// - under low pressure otherwise, only entries past the ancient grace
    ///   window go (hot domains excepted).
    ///
    /// The pass is bounded by both an entry budget and a wall-clock budget
    /// so an arbitrarily deep backlog cannot stall the query path.
    pub fn clean_expired(&self) {
        let started = Instant::now();
        let now = unix_now_secs();
        let max_duration = Duration::from_millis(self.config.cleanup_max_duration_ms);

        // Absorb insert events that no worker has consumed yet (startup,
        // synchronous callers). No-op once the worker runs.
        self.expiry.absorb_pending();

        let usage = self.usage_ratio();
        let mut threshold = self.config.eviction_pressure_threshold;
        if threshold <= 0.0 {
            threshold = 0.9;
        }
        let high_pressure = usage >= threshold;

        let mut removed = 0usize;

        {
            let mut heap = self.expiry.heap().lock().expect("expiry heap lock");

            while let Some(std::cmp::Reverse(index)) = heap.peek() {
                if removed >= self.config.cleanup_max_entries {
                    break;
                }
                if started.elapsed() > max_duration {
                    break;
                }

                // Not yet expired: every later heap entry expires later.
                if index.expires_at_secs > now {
                    break;
                }

                let Some(live) = self.peek_raw(&index.key) else {
                    // Evicted or overwritten away entirely: drop the index.
                    heap.pop();
                    continue;
                };

                // A version mismatch means this index described an older
                // write; the live entry's own index is still in the heap.
                if live.version != index.version {
                    heap.pop();
                    continue;
                }

                let should_delete = if high_pressure {
                    true
                } else if self.config.keep_expired_entries {
                    // Low pressure, stale data explicitly kept servable.
                    break;
                } else if index.expires_at_secs + self.config.ancient_grace_secs <= now {
                    if self.is_protected_domain(index.key.domain.as_str()) {
                        // Hot domain: discard the index, keep the entry.
                        heap.pop();
                        continue;
                    }
                    true
                } else {
                    // Expired but not ancient; later entries are younger.
                    break;
                };

                if should_delete {
                    if let Some(std::cmp::Reverse(index)) = heap.pop() {
                        self.evict_raw_key(&index.key);
                        self.dirty.fetch_add(1, AtomicOrdering::Relaxed);
                        removed += 1;
                    }
                }
            }
        }

        self.sweep_auxiliary_tiers();

        let duration = started.elapsed();
        {
            let mut stats = self.cleanup_stats.lock().expect("cleanup stats lock");
            stats.last_run_at_secs = now;
            stats.last_removed = removed;
            stats.last_duration = duration;
            stats.heap_len = self.expiry.len();
        }

        if removed > 0 {
            debug!(
                removed,
                usage = format_args!("{:.2}", usage),
                high_pressure,
                duration_us = duration.as_micros() as u64,
                "Expired cache entries reclaimed"
            );
        }
    }

    /// The derived tiers have no heap index; they are small enough to sweep
    /// by iteration.
    fn sweep_auxiliary_tiers(&self) {
        let now = unix_now_secs();
        self.sorted.retain(|_, entry| !entry.is_expired_at(now));
        self.errors.sweep_expired();
        self.sweep_completed_sorts();
    }

    pub fn cleanup_stats(&self) -> CleanupStats {
        let mut stats = self
            .cleanup_stats
            .lock()
            .expect("cleanup stats lock")
            .clone();
        stats.heap_len = self.expiry_index_len();
        stats
    }
}
