use super::queue::{SortQueue, SortTask};
use crate::dns::cache::{SortedCacheEntry, SortingState, TieredCache};
use compact_str::CompactString;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use velo_dns_domain::{DomainError, RecordType, SortConfig};
use velo_dns_application::RttRanker;

/// Front door of the ranking pipeline. Deduplicates concurrent rank
/// requests per key through the cache's sorting registry, short-circuits
/// the trivial single-address case, and pushes real work onto the bounded
/// queue. Queue overflow fails the task instead of blocking; the caller
/// keeps serving the unsorted raw answer.
pub struct SortingCoordinator {
    cache: Arc<TieredCache>,
    queue: SortQueue,
}

impl SortingCoordinator {
    pub fn new(cache: Arc<TieredCache>, ranker: Arc<dyn RttRanker>, config: &SortConfig) -> Self {
        Self {
            queue: SortQueue::new(config, ranker),
            cache,
        }
    }

    /// Kick off (or join) the rank task for this key. The returned state
    /// completes when the ranking lands in the sorted tier; callers that
    /// don't care may simply drop it.
    pub fn schedule_sort(
        &self,
        domain: &str,
        record_type: RecordType,
        ips: Vec<IpAddr>,
        ttl: u32,
    ) -> Arc<SortingState> {
        let (state, is_new) = self.cache.get_or_start_sort(domain, record_type);
        if !is_new {
            debug!(domain, "Rank task already in flight, joining");
            return state;
        }

        if ips.is_empty() {
            self.cache.finish_sort(
                domain,
                record_type,
                None,
                Some(DomainError::EmptyResponse),
                &state,
            );
            return state;
        }

        // One candidate: nothing to measure, synthesize the result inline.
        if ips.len() == 1 {
            let entry = SortedCacheEntry::single(ips[0], ttl);
            self.cache.set_sorted(domain, record_type, entry.clone());
            self.cache
                .finish_sort(domain, record_type, Some(entry), None, &state);
            return state;
        }

        let cache = Arc::clone(&self.cache);
        let owner_state = Arc::clone(&state);
        let callback_domain = domain.to_string();
        let task = SortTask {
            domain: CompactString::from(domain),
            record_type,
            ips,
            ttl,
            callback: Box::new(move |outcome| match outcome {
                Ok(entry) => {
                    cache.set_sorted(&callback_domain, record_type, entry.clone());
                    cache.finish_sort(
                        &callback_domain,
                        record_type,
                        Some(entry),
                        None,
                        &owner_state,
                    );
                }
                Err(err) => {
                    cache.finish_sort(&callback_domain, record_type, None, Some(err), &owner_state);
                }
            }),
        };

        if let Err(task) = self.queue.submit(task) {
            warn!(domain, "Sort queue full, failing rank task");
            self.cache.finish_sort(
                domain,
                record_type,
                None,
                Some(DomainError::SortQueueFull),
                &state,
            );
            drop(task);
        }

        state
    }

    /// Schedule and wait for the outcome; `None` means a concurrent task
    /// completed without a usable result.
    pub async fn sort_and_wait(
        &self,
        domain: &str,
        record_type: RecordType,
        ips: Vec<IpAddr>,
        ttl: u32,
    ) -> Result<Option<SortedCacheEntry>, DomainError> {
        let state = self.schedule_sort(domain, record_type, ips, ttl);
        state.wait().await;
        state.outcome()
    }

    /// New addresses arrived while a rank was in flight: invalidate the old
    /// task and its cached result, then start over with the fuller set.
    pub fn resort_with(
        &self,
        domain: &str,
        record_type: RecordType,
        ips: Vec<IpAddr>,
        ttl: u32,
    ) -> Arc<SortingState> {
        self.cache.cancel_sort(domain, record_type);
        self.schedule_sort(domain, record_type, ips, ttl)
    }

    pub fn queue_stats(&self) -> (u64, u64) {
        self.queue.stats()
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
