use super::health::{HealthStatus, ServerHealth};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use velo_dns_domain::{DnsQuestion, DomainError, HealthCheckConfig, UpstreamResponse};
use velo_dns_application::Upstream;

/// An `Upstream` paired with its health state. Every exchange flows through
/// here, and this is the only place health marks happen, so strategies can't
/// double-count an attempt.
pub struct HealthAwareUpstream {
    upstream: Arc<dyn Upstream>,
    health: ServerHealth,
}

impl HealthAwareUpstream {
    pub fn new(upstream: Arc<dyn Upstream>, config: HealthCheckConfig) -> Self {
        let health = ServerHealth::new(upstream.address(), config);
        Self { upstream, health }
    }

    /// Exchange with a per-attempt deadline, classifying the outcome:
    /// - elapsed deadline → timeout mark (EWMA penalty, no breaker count);
    /// - transport error → failure mark;
    /// - SERVFAIL/REFUSED/... → failure mark (the transport worked, the
    ///   server didn't);
    /// - NOERROR and NXDOMAIN → success mark + latency sample. NXDOMAIN is
    ///   a correct answer at the health level.
    pub async fn exchange(
        &self,
        question: &DnsQuestion,
        attempt_timeout: Duration,
    ) -> Result<UpstreamResponse, DomainError> {
        let started = Instant::now();
        match timeout(attempt_timeout, self.upstream.exchange(question)).await {
            Err(_) => {
                self.health.mark_timeout(attempt_timeout.saturating_mul(2));
                Err(DomainError::QueryTimeout)
            }
            Ok(Err(err)) => {
                if matches!(err, DomainError::QueryTimeout) {
                    self.health.mark_timeout(attempt_timeout.saturating_mul(2));
                } else {
                    self.health.mark_failure();
                }
                Err(err)
            }
            Ok(Ok(response)) => {
                if response.rcode.is_server_error() {
                    self.health.mark_failure();
                } else {
                    self.health.record_latency(started.elapsed());
                    self.health.mark_success();
                }
                Ok(response)
            }
        }
    }

    pub fn address(&self) -> &str {
        self.upstream.address()
    }

    pub fn protocol(&self) -> &str {
        self.upstream.protocol()
    }

    pub fn health(&self) -> &ServerHealth {
        &self.health
    }

    pub fn status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn should_skip_temporarily(&self) -> bool {
        self.health.should_skip_temporarily()
    }

    pub fn latency(&self) -> Duration {
        self.health.latency()
    }
}
