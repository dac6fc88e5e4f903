use async_trait::async_trait;
use velo_dns_domain::{DnsQuestion, DomainError, UpstreamResponse};

/// One upstream resolver endpoint, whatever its transport. Implementations
/// (UDP/TCP/DoT/DoH, connection pooling, TC-bit retries) live outside this
/// core; the orchestrator only sees exchange semantics.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send one query and await its response. Implementations return
    /// `DomainError::QueryTimeout` / `DomainError::Transport` for
    /// network-level failures; DNS-level failures come back as a response
    /// with the corresponding rcode.
    async fn exchange(&self, question: &DnsQuestion) -> Result<UpstreamResponse, DomainError>;

    /// Display address, used for logs and health bookkeeping.
    fn address(&self) -> &str;

    /// Transport name ("udp", "tcp", "dot", "doh").
    fn protocol(&self) -> &str;
}
