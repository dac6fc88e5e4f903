use async_trait::async_trait;
use std::net::IpAddr;
use velo_dns_domain::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedAddresses {
    /// Addresses ordered best-first.
    pub addresses: Vec<IpAddr>,
    /// Measured RTT in milliseconds, parallel to `addresses`.
    pub rtts_ms: Vec<u32>,
}

/// The RTT-measurement ("ping") subsystem, reduced to a single capability.
#[async_trait]
pub trait RttRanker: Send + Sync {
    async fn rank(&self, addresses: Vec<IpAddr>) -> Result<RankedAddresses, DomainError>;
}
