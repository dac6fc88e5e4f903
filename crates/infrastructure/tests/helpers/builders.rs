use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use velo_dns_domain::{
    CacheConfig, DnsQuestion, DnsRecord, DomainError, RecordData, RecordType, ResponseCode,
    SortConfig, UpstreamResponse,
};
use velo_dns_application::{HotDomainTracker, RankedAddresses, RttRanker};
use velo_dns_infrastructure::dns::cache::RawWrite;

pub fn question(domain: &str) -> DnsQuestion {
    DnsQuestion::new(domain, RecordType::A)
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn a_response(name: &str, ttl: u32, ips: &[&str]) -> UpstreamResponse {
    let answers = ips
        .iter()
        .map(|addr| DnsRecord::a(name, ttl, addr.parse().unwrap()))
        .collect();
    UpstreamResponse::with_answers(answers)
}

pub fn nxdomain_response(zone: &str, negative_ttl: u32) -> UpstreamResponse {
    let mut response = UpstreamResponse::empty(ResponseCode::NxDomain);
    response.authority.push(DnsRecord::new(
        zone,
        negative_ttl,
        RecordData::Soa {
            mname: Arc::from("ns1.example.net"),
            rname: Arc::from("hostmaster.example.net"),
            serial: 2024010101,
            minimum: negative_ttl,
        },
    ));
    response
}

pub fn raw_write(ips: &[&str], ttl: u32) -> RawWrite {
    RawWrite {
        ips: ips.iter().map(|s| s.parse().unwrap()).collect(),
        cnames: Vec::new(),
        records: ips
            .iter()
            .map(|s| match s.parse().unwrap() {
                IpAddr::V4(v4) => DnsRecord::a("test.example", ttl, v4),
                IpAddr::V6(v6) => DnsRecord::aaaa("test.example", ttl, v6),
            })
            .collect(),
        ttl,
        authenticated: false,
    }
}

pub fn small_cache_config(max_entries: usize) -> CacheConfig {
    CacheConfig {
        max_entries,
        cleanup_max_duration_ms: 1000,
        ..CacheConfig::default()
    }
}

pub fn sort_config(workers: usize, queue_size: usize) -> SortConfig {
    SortConfig {
        workers,
        queue_size,
        task_timeout_ms: 2000,
    }
}

/// Ranker that reverses the candidate order and invents RTTs of
/// 10, 20, 30, ... ms. Deterministic and obviously "ranked".
pub struct ReversingRanker;

#[async_trait]
impl RttRanker for ReversingRanker {
    async fn rank(&self, addresses: Vec<IpAddr>) -> Result<RankedAddresses, DomainError> {
        let mut reversed = addresses;
        reversed.reverse();
        let rtts_ms = (1..=reversed.len() as u32).map(|i| i * 10).collect();
        Ok(RankedAddresses {
            addresses: reversed,
            rtts_ms,
        })
    }
}

/// Ranker that takes a fixed time before answering; for queue backpressure
/// tests.
pub struct SlowRanker(pub Duration);

#[async_trait]
impl RttRanker for SlowRanker {
    async fn rank(&self, addresses: Vec<IpAddr>) -> Result<RankedAddresses, DomainError> {
        tokio::time::sleep(self.0).await;
        let rtts_ms = vec![1; addresses.len()];
        Ok(RankedAddresses {
            addresses,
            rtts_ms,
        })
    }
}

pub struct FailingRanker;

#[async_trait]
impl RttRanker for FailingRanker {
    async fn rank(&self, _addresses: Vec<IpAddr>) -> Result<RankedAddresses, DomainError> {
        Err(DomainError::RankingFailed("probe refused".into()))
    }
}

/// Fixed set of "hot" domains.
pub struct TopDomains(pub HashSet<String>);

impl TopDomains {
    pub fn of(domains: &[&str]) -> Arc<Self> {
        Arc::new(Self(domains.iter().map(|d| d.to_string()).collect()))
    }
}

impl HotDomainTracker for TopDomains {
    fn is_top_domain(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }

    fn record_access(&self, _domain: &str, _ttl: u32) {}
}
