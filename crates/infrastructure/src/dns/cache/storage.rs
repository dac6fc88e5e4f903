use super::entry::{MessageCacheEntry, RawCacheEntry, SortedCacheEntry};
use super::error_tier::ErrorTier;
use super::expiry::ExpiryIndex;
use super::key::CacheKey;
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use super::sorting::SortingState;
use compact_str::CompactString;
use dashmap::DashMap;
use lru::LruCache;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, info};
use velo_dns_domain::{
    CacheConfig, DnsRecord, RecordType, ResponseCode, UpstreamResponse,
};
use velo_dns_application::HotDomainTracker;

/// A stale raw entry was served; whoever drains this should re-resolve the
/// name and write the result back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub domain: CompactString,
    pub record_type: RecordType,
}

/// Payload for a raw-tier write. Bundled so foreground stores and background
/// merge completions go through the identical code path.
#[derive(Debug, Clone)]
pub struct RawWrite {
    pub ips: Vec<IpAddr>,
    pub cnames: Vec<Arc<str>>,
    pub records: Vec<DnsRecord>,
    pub ttl: u32,
    pub authenticated: bool,
}

/// The four tier stores plus the expiry index and the sort-task registry.
/// Each tier is locked independently; nothing does I/O under a lock, and the
/// raw-tier write path never touches the heap lock (events go through the
/// expiry channel).
pub struct TieredCache {
    pub(super) config: CacheConfig,
    pub(super) raw: Mutex<LruCache<CacheKey, RawCacheEntry>>,
    pub(super) sorted: DashMap<CacheKey, SortedCacheEntry, FxBuildHasher>,
    pub(super) errors: ErrorTier,
    pub(super) messages: Option<Mutex<LruCache<CacheKey, MessageCacheEntry>>>,
    pub(super) sorting: Mutex<FxHashMap<CacheKey, Arc<SortingState>>>,
    pub(super) expiry: ExpiryIndex,
    pub(super) metrics: Arc<CacheMetrics>,
    pub(super) cleanup_stats: Mutex<super::cleanup::CleanupStats>,
    refresh_tx: OnceLock<mpsc::Sender<RefreshRequest>>,
    hot_domains: OnceLock<Arc<dyn HotDomainTracker>>,
    /// Bumped on every raw write; persistence skips saving when unchanged.
    pub(super) dirty: AtomicU64,
    pub(super) last_saved_dirty: AtomicU64,
}

impl TieredCache {
    pub fn new(config: CacheConfig) -> Self {
        let metrics = Arc::new(CacheMetrics::default());
        let max_entries = config.max_entries.max(1);

        // Message entries average ~2 KiB once parsed; size the tier from the
        // configured memory budget.
        let messages = if config.message_cache_mb > 0 {
            let entries = ((config.message_cache_mb * 1024 * 1024) / 2048).max(10);
            let cap = NonZeroUsize::new(entries).expect("non-zero message capacity");
            Some(Mutex::new(LruCache::new(cap)))
        } else {
            None
        };

        info!(
            max_entries,
            pressure_threshold = config.eviction_pressure_threshold,
            keep_expired = config.keep_expired_entries,
            "Initializing tiered DNS cache"
        );

        Self {
            raw: Mutex::new(LruCache::new(
                NonZeroUsize::new(max_entries).expect("non-zero raw capacity"),
            )),
            sorted: DashMap::with_hasher(FxBuildHasher),
            errors: ErrorTier::new(max_entries),
            messages,
            sorting: Mutex::new(FxHashMap::default()),
            expiry: ExpiryIndex::new(config.expiry_queue_size, Arc::clone(&metrics)),
            metrics,
            cleanup_stats: Mutex::new(super::cleanup::CleanupStats::default()),
            refresh_tx: OnceLock::new(),
            hot_domains: OnceLock::new(),
            dirty: AtomicU64::new(0),
            last_saved_dirty: AtomicU64::new(0),
            config,
        }
    }

    /// Start the background expiry-index worker. Requires a tokio runtime;
    /// everything else works without it (events are absorbed lazily).
    pub fn start(&self) {
        self.expiry.spawn_worker();
    }

    pub fn shutdown(&self) {
        self.expiry.shutdown();
    }

    /// Wire the stale-refresh consumer. Stale hits push `(domain, type)`
    /// here; a full channel drops the request (the next stale hit retries).
    pub fn set_stale_refresh_sender(&self, tx: mpsc::Sender<RefreshRequest>) {
        let _ = self.refresh_tx.set(tx);
    }

    pub fn set_hot_domain_tracker(&self, tracker: Arc<dyn HotDomainTracker>) {
        let _ = self.hot_domains.set(tracker);
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn raw_len(&self) -> usize {
        self.raw.lock().expect("raw tier lock").len()
    }

    pub fn error_len(&self) -> usize {
        self.errors.len()
    }

    pub fn sorted_len(&self) -> usize {
        self.sorted.len()
    }

    pub fn expiry_index_len(&self) -> usize {
        self.expiry.len()
    }

    /// Live raw entries over the configured maximum.
    pub fn usage_ratio(&self) -> f64 {
        if self.config.max_entries == 0 {
            return 0.0;
        }
        self.raw_len() as f64 / self.config.max_entries as f64
    }

    /// Raw entries whose domain the prefetcher currently ranks as hot.
    pub fn protected_entries(&self) -> usize {
        let Some(tracker) = self.hot_domains.get() else {
            return 0;
        };
        if !self.config.protect_hot_domains {
            return 0;
        }
        let raw = self.raw.lock().expect("raw tier lock");
        raw.iter()
            .filter(|(key, _)| tracker.is_top_domain(key.domain.as_str()))
            .count()
    }

    pub(super) fn is_protected_domain(&self, domain: &str) -> bool {
        self.config.protect_hot_domains
            && self
                .hot_domains
                .get()
                .is_some_and(|t| t.is_top_domain(domain))
    }

    // ------------------------------------------------------------------
    // Raw tier
    // ------------------------------------------------------------------

    /// Fetch the raw entry, expired or not. Freshness is the caller's call:
    /// stale entries are deliberately servable (stale-while-revalidate), and
    /// a stale hit enqueues one refresh request as a side effect.
    pub fn get_raw(&self, domain: &str, record_type: RecordType) -> Option<RawCacheEntry> {
        let key = CacheKey::new(domain, record_type);
        let entry = {
            let mut raw = self.raw.lock().expect("raw tier lock");
            raw.get(&key).cloned()
        };

        match entry {
            Some(entry) => {
                self.metrics.hits.fetch_add(1, AtomicOrdering::Relaxed);
                if entry.is_expired() {
                    self.metrics.stale_hits.fetch_add(1, AtomicOrdering::Relaxed);
                    self.request_refresh(&entry, domain, record_type);
                }
                Some(entry)
            }
            None => {
                self.metrics.misses.fetch_add(1, AtomicOrdering::Relaxed);
                None
            }
        }
    }

    fn request_refresh(&self, entry: &RawCacheEntry, domain: &str, record_type: RecordType) {
        let Some(tx) = self.refresh_tx.get() else {
            return;
        };
        // One refresh per expiry: first stale reader wins the flag.
        if entry
            .refreshing
            .compare_exchange(
                false,
                true,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_err()
        {
            return;
        }
        let request = RefreshRequest {
            domain: CompactString::from(domain),
            record_type,
        };
        if tx.try_send(request).is_err() {
            // Channel full: release the flag so a later stale hit retries.
            entry.refreshing.store(false, AtomicOrdering::Release);
            self.metrics
                .refresh_events_dropped
                .fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    /// Called by the refresh consumer once its re-resolution finished
    /// (successfully or not), re-arming the stale trigger.
    pub fn reset_refreshing(&self, domain: &str, record_type: RecordType) {
        let key = CacheKey::new(domain, record_type);
        let raw = self.raw.lock().expect("raw tier lock");
        if let Some(entry) = raw.peek(&key) {
            entry.refreshing.store(false, AtomicOrdering::Release);
        }
    }

    /// Versioned raw write. Returns false (and leaves the tier untouched)
    /// when a newer write already landed; this is the ordering law for
    /// background completions racing foreground refreshes.
    pub fn set_raw(
        &self,
        domain: &str,
        record_type: RecordType,
        write: RawWrite,
        version: u64,
    ) -> bool {
        let key = CacheKey::new(domain, record_type);
        let ttl = write.ttl;
        let expires_at;
        {
            let mut raw = self.raw.lock().expect("raw tier lock");
            if let Some(live) = raw.peek(&key) {
                if live.version > version {
                    drop(raw);
                    debug!(
                        domain,
                        record_type = %record_type,
                        stale_version = version,
                        "Dropping stale raw-cache write"
                    );
                    self.metrics
                        .stale_writes_dropped
                        .fetch_add(1, AtomicOrdering::Relaxed);
                    return false;
                }
            }

            let entry = RawCacheEntry::new(
                write.ips,
                write.cnames,
                write.records,
                write.ttl,
                write.authenticated,
                version,
            );
            expires_at = entry.expires_at_secs();
            if let Some((evicted_key, _)) = raw.push(key.clone(), entry) {
                if evicted_key != key {
                    self.metrics.evictions.fetch_add(1, AtomicOrdering::Relaxed);
                }
            }
        }

        self.dirty.fetch_add(1, AtomicOrdering::Relaxed);
        self.expiry.post(key, expires_at, version);
        if let Some(tracker) = self.hot_domains.get() {
            tracker.record_access(domain, ttl);
        }
        true
    }

    pub fn remove_raw(&self, domain: &str, record_type: RecordType) -> bool {
        let key = CacheKey::new(domain, record_type);
        let removed = self
            .raw
            .lock()
            .expect("raw tier lock")
            .pop(&key)
            .is_some();
        if removed {
            self.metrics.evictions.fetch_add(1, AtomicOrdering::Relaxed);
            self.dirty.fetch_add(1, AtomicOrdering::Relaxed);
        }
        removed
    }

    /// Read without promoting recency: the cleanup pass must not turn the
    /// entries it inspects into recently-used ones.
    pub(super) fn peek_raw(&self, key: &CacheKey) -> Option<RawCacheEntry> {
        self.raw.lock().expect("raw tier lock").peek(key).cloned()
    }

    pub(super) fn evict_raw_key(&self, key: &CacheKey) -> bool {
        let removed = self.raw.lock().expect("raw tier lock").pop(key).is_some();
        if removed {
            self.metrics.evictions.fetch_add(1, AtomicOrdering::Relaxed);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Sorted tier
    // ------------------------------------------------------------------

    /// Expired or invalidated sorted entries read as absent; the raw tier is
    /// the fallback.
    pub fn get_sorted(&self, domain: &str, record_type: RecordType) -> Option<SortedCacheEntry> {
        let key = CacheKey::new(domain, record_type);
        let entry = self.sorted.get(&key)?;
        if entry.value().is_expired() {
            return None;
        }
        Some(entry.value().clone())
    }

    /// A new ranking supersedes the previous one wholesale.
    pub fn set_sorted(&self, domain: &str, record_type: RecordType, entry: SortedCacheEntry) {
        let key = CacheKey::new(domain, record_type);
        self.sorted.insert(key, entry);
    }

    pub fn remove_sorted(&self, domain: &str, record_type: RecordType) {
        self.sorted.remove(&CacheKey::new(domain, record_type));
    }

    // ------------------------------------------------------------------
    // Error tier
    // ------------------------------------------------------------------

    pub fn get_error(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> Option<super::entry::ErrorCacheEntry> {
        self.errors.get(domain, record_type)
    }

    pub fn set_error(&self, domain: &str, record_type: RecordType, rcode: ResponseCode, ttl: u32) {
        self.errors.insert(domain, record_type, rcode, ttl);
    }

    pub fn remove_error(&self, domain: &str, record_type: RecordType) {
        self.errors.remove(domain, record_type);
    }

    // ------------------------------------------------------------------
    // Message tier (validated DNSSEC responses)
    // ------------------------------------------------------------------

    /// Expired message entries are evicted eagerly on read: replaying a
    /// validated answer past its TTL would defeat the point of caching it.
    pub fn get_message(&self, domain: &str, record_type: RecordType) -> Option<UpstreamResponse> {
        let messages = self.messages.as_ref()?;
        let key = CacheKey::new(domain, record_type);
        let mut tier = messages.lock().expect("message tier lock");
        let expired = match tier.peek(&key) {
            Some(entry) => entry.is_expired_at(crate::dns::clock::unix_now_secs()),
            None => return None,
        };
        if expired {
            tier.pop(&key);
            return None;
        }
        tier.get(&key).map(|entry| entry.response.clone())
    }

    pub fn set_message(&self, domain: &str, record_type: RecordType, response: UpstreamResponse) {
        let Some(messages) = self.messages.as_ref() else {
            return;
        };
        // Lifetime follows the shortest-lived record, optionally capped.
        let mut ttl = response.min_ttl().unwrap_or(60);
        if self.config.message_cache_ttl_secs > 0 {
            ttl = ttl.min(self.config.message_cache_ttl_secs);
        }
        let key = CacheKey::new(domain, record_type);
        messages
            .lock()
            .expect("message tier lock")
            .put(key, MessageCacheEntry::new(response, ttl));
    }

    // ------------------------------------------------------------------

    /// Drop everything, waking any sort waiters with a cancellation.
    pub fn clear(&self) {
        {
            let mut sorting = self.sorting.lock().expect("sorting registry lock");
            for state in sorting.values() {
                state.cancel();
            }
            sorting.clear();
        }
        self.raw.lock().expect("raw tier lock").clear();
        self.sorted.clear();
        self.errors.clear();
        if let Some(messages) = self.messages.as_ref() {
            messages.lock().expect("message tier lock").clear();
        }
        self.expiry.clear();
        self.dirty.fetch_add(1, AtomicOrdering::Relaxed);
        info!("Cache cleared");
    }
}
