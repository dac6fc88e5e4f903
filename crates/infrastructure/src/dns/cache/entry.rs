use crate::dns::clock::unix_now_secs;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use velo_dns_domain::{DnsRecord, ResponseCode, UpstreamResponse};

/// Raw upstream answer before latency ranking. Replaced atomically on every
/// successful resolution, never mutated in place; `version` orders
/// concurrent writers (a write stamped lower than the live entry loses).
#[derive(Debug, Clone)]
pub struct RawCacheEntry {
    pub ips: Vec<IpAddr>,
    /// Full CNAME chain, in answer order; empty for direct answers.
    pub cnames: Vec<Arc<str>>,
    pub records: Vec<DnsRecord>,
    pub upstream_ttl: u32,
    pub acquired_at_secs: u64,
    /// DNSSEC AD flag observed on the upstream response.
    pub authenticated: bool,
    pub version: u64,
    /// Shared across clones so a stale entry enqueues at most one refresh.
    pub(super) refreshing: Arc<AtomicBool>,
}

impl RawCacheEntry {
    pub fn new(
        ips: Vec<IpAddr>,
        cnames: Vec<Arc<str>>,
        records: Vec<DnsRecord>,
        upstream_ttl: u32,
        authenticated: bool,
        version: u64,
    ) -> Self {
        Self {
            ips,
            cnames,
            records,
            upstream_ttl,
            acquired_at_secs: unix_now_secs(),
            authenticated,
            version,
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn expires_at_secs(&self) -> u64 {
        self.acquired_at_secs + self.upstream_ttl as u64
    }

    /// Freshness only; an expired raw entry is still servable under
    /// stale-while-revalidate, so callers decide what expiry means.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now_secs())
    }

    #[inline]
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs >= self.expires_at_secs()
    }

    pub fn remaining_ttl(&self, now_secs: u64) -> u32 {
        self.expires_at_secs().saturating_sub(now_secs) as u32
    }
}

/// Latency-ranked view of a raw entry's addresses. Produced only by a
/// completed sort task; the next completion supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedCacheEntry {
    pub ips: Vec<IpAddr>,
    /// RTT per address, parallel to `ips` (same length).
    pub rtts_ms: Vec<u32>,
    pub sorted_at_secs: u64,
    pub ttl_secs: u32,
    pub is_valid: bool,
}

impl SortedCacheEntry {
    pub fn new(ips: Vec<IpAddr>, rtts_ms: Vec<u32>, ttl_secs: u32) -> Self {
        debug_assert_eq!(ips.len(), rtts_ms.len());
        Self {
            ips,
            rtts_ms,
            sorted_at_secs: unix_now_secs(),
            ttl_secs,
            is_valid: true,
        }
    }

    /// Trivial entry for the single-address fast path: nothing to measure.
    pub fn single(ip: IpAddr, ttl_secs: u32) -> Self {
        Self::new(vec![ip], vec![0], ttl_secs)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now_secs())
    }

    #[inline]
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        if !self.is_valid {
            return true;
        }
        now_secs.saturating_sub(self.sorted_at_secs) >= self.ttl_secs as u64
    }
}

/// Negative / error outcome (NXDOMAIN, NODATA, short-TTL SERVFAIL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCacheEntry {
    pub rcode: ResponseCode,
    pub cached_at_secs: u64,
    pub ttl_secs: u32,
}

impl ErrorCacheEntry {
    pub fn new(rcode: ResponseCode, ttl_secs: u32) -> Self {
        Self {
            rcode,
            cached_at_secs: unix_now_secs(),
            ttl_secs,
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs.saturating_sub(self.cached_at_secs) >= self.ttl_secs as u64
    }

    pub fn remaining_ttl(&self, now_secs: u64) -> u32 {
        (self.cached_at_secs + self.ttl_secs as u64).saturating_sub(now_secs) as u32
    }
}

/// Complete upstream response kept for DNSSEC passthrough, so a validated
/// message can be replayed to DO-bit clients without re-querying.
#[derive(Debug, Clone)]
pub struct MessageCacheEntry {
    pub response: UpstreamResponse,
    pub acquired_at_secs: u64,
    pub ttl_secs: u32,
}

impl MessageCacheEntry {
    pub fn new(response: UpstreamResponse, ttl_secs: u32) -> Self {
        Self {
            response,
            acquired_at_secs: unix_now_secs(),
            ttl_secs,
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs.saturating_sub(self.acquired_at_secs) >= self.ttl_secs as u64
    }
}

/// On-disk form of one raw-tier entry. TTLs and versions are deliberately
/// not persisted: restored entries start with the configured default TTL
/// and version 0, so any live resolution overwrites them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCacheEntry {
    pub domain: String,
    pub qtype: u16,
    pub ips: Vec<IpAddr>,
    #[serde(default)]
    pub cnames: Vec<String>,
}
