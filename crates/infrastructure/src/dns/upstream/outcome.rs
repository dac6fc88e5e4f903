use rustc_hash::FxHashSet;
use std::net::IpAddr;
use std::sync::Arc;
use velo_dns_domain::{
    DnsRecord, RecordData, RecordType, ResponseCode, UpstreamResponse,
};

/// What the orchestrator hands back to the caller (and, merged, to the
/// cache-update callback). `Clone` because the deduplicator fans one reply
/// out to every collapsed waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReply {
    pub records: Vec<DnsRecord>,
    pub ips: Vec<IpAddr>,
    pub cnames: Vec<Arc<str>>,
    pub ttl: u32,
    pub rcode: ResponseCode,
    pub authenticated: bool,
    /// Monotonic stamp ordering this resolution against concurrent ones;
    /// rides into the background cache update.
    pub version: u64,
}

impl QueryReply {
    pub fn has_data(&self) -> bool {
        !self.ips.is_empty() || !self.cnames.is_empty()
    }

    pub fn negative(rcode: ResponseCode, ttl: u32, version: u64) -> Self {
        Self {
            records: Vec::new(),
            ips: Vec::new(),
            cnames: Vec::new(),
            ttl,
            rcode,
            authenticated: false,
            version,
        }
    }

    pub(super) fn from_response(response: &UpstreamResponse, version: u64) -> Self {
        let (records, cnames, ttl) = extract_records(response);
        let ips = records.iter().filter_map(|r| r.data.as_ip()).collect();
        Self {
            records,
            ips,
            cnames,
            ttl,
            rcode: response.rcode,
            authenticated: response.authenticated,
            version,
        }
    }
}

/// Merged result of background collection, delivered through the
/// cache-update callback once the slower servers have answered.
#[derive(Debug, Clone)]
pub struct CacheUpdate {
    pub domain: Arc<str>,
    pub record_type: RecordType,
    pub records: Vec<DnsRecord>,
    pub ips: Vec<IpAddr>,
    pub cnames: Vec<Arc<str>>,
    pub ttl: u32,
    pub version: u64,
}

pub type CacheUpdateCallback = Arc<dyn Fn(CacheUpdate) + Send + Sync>;

/// Pull answer records, the CNAME chain and the minimum answer TTL out of a
/// response. 60s default when the answer section is empty.
pub(super) fn extract_records(
    response: &UpstreamResponse,
) -> (Vec<DnsRecord>, Vec<Arc<str>>, u32) {
    let mut cnames = Vec::new();
    let mut min_ttl: Option<u32> = None;

    for record in &response.answers {
        if let RecordData::Cname(target) = &record.data {
            cnames.push(Arc::clone(target));
        }
        min_ttl = Some(match min_ttl {
            Some(current) => current.min(record.ttl),
            None => record.ttl,
        });
    }

    (response.answers.clone(), cnames, min_ttl.unwrap_or(60))
}

/// Union of several servers' answers, deduplicated by natural key: the
/// address for A/AAAA, the target for CNAME, the full string form for
/// anything else (a heuristic: two spellings of the same rdata count as
/// two records).
pub(super) fn merge_and_deduplicate(replies: &[&QueryReply]) -> Vec<DnsRecord> {
    let mut ip_seen: FxHashSet<String> = FxHashSet::default();
    let mut cname_seen: FxHashSet<String> = FxHashSet::default();
    let mut other_seen: FxHashSet<String> = FxHashSet::default();
    let mut merged = Vec::new();

    for reply in replies {
        for record in &reply.records {
            let seen = match &record.data {
                RecordData::A(_) | RecordData::Aaaa(_) => &mut ip_seen,
                RecordData::Cname(_) => &mut cname_seen,
                _ => &mut other_seen,
            };
            if seen.insert(record.natural_key()) {
                merged.push(record.clone());
            }
        }
    }

    merged
}
