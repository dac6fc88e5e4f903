use super::entry::ErrorCacheEntry;
use super::key::CacheKey;
use crate::dns::clock::unix_now_secs;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use velo_dns_domain::{RecordType, ResponseCode};

/// Negative / error-outcome tier. Kept apart from the raw tier: in blocker
/// and typo-heavy workloads a large share of queries end in NXDOMAIN, and
/// mixing those with positive entries contends the same shards and skews
/// eviction. Expiry is checked (and the entry dropped) on read.
pub(super) struct ErrorTier {
    map: DashMap<CacheKey, ErrorCacheEntry, FxBuildHasher>,
    max_entries: usize,
}

impl ErrorTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            map: DashMap::with_capacity_and_hasher(max_entries.min(65_536), FxBuildHasher),
            max_entries,
        }
    }

    pub fn get(&self, domain: &str, record_type: RecordType) -> Option<ErrorCacheEntry> {
        let key = CacheKey::new(domain, record_type);
        let now = unix_now_secs();
        match self.map.entry(key) {
            dashmap::Entry::Vacant(_) => None,
            dashmap::Entry::Occupied(occupied) => {
                let entry = *occupied.get();
                if entry.is_expired_at(now) {
                    occupied.remove();
                    None
                } else {
                    Some(entry)
                }
            }
        }
    }

    pub fn insert(&self, domain: &str, record_type: RecordType, rcode: ResponseCode, ttl: u32) {
        if self.map.len() >= self.max_entries {
            self.prune(64);
        }
        let key = CacheKey::new(domain, record_type);
        self.map.insert(key, ErrorCacheEntry::new(rcode, ttl));
    }

    /// Drop up to `budget` expired entries; if that frees nothing, sacrifice
    /// an arbitrary one so insertion always proceeds.
    fn prune(&self, budget: usize) {
        let now = unix_now_secs();
        let expired: Vec<CacheKey> = self
            .map
            .iter()
            .filter(|e| e.value().is_expired_at(now))
            .map(|e| e.key().clone())
            .take(budget)
            .collect();
        for key in &expired {
            self.map.remove(key);
        }
        if self.map.len() >= self.max_entries {
            if let Some(key) = self.map.iter().map(|e| e.key().clone()).next() {
                self.map.remove(&key);
            }
        }
    }

    pub fn remove(&self, domain: &str, record_type: RecordType) {
        self.map.remove(&CacheKey::new(domain, record_type));
    }

    pub fn sweep_expired(&self) {
        let now = unix_now_secs();
        self.map.retain(|_, entry| !entry.is_expired_at(now));
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}
