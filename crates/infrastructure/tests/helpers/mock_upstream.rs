use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use velo_dns_domain::{DnsQuestion, DomainError, UpstreamResponse};
use velo_dns_application::Upstream;

/// Scripted upstream endpoint: waits its configured delay, then plays back
/// its behavior. Counts exchanges so tests can assert who was queried.
pub struct MockUpstream {
    address: String,
    delay: Duration,
    behavior: Behavior,
    calls: AtomicUsize,
}

#[derive(Clone)]
pub enum Behavior {
    Respond(UpstreamResponse),
    Fail(DomainError),
    /// Never answers within any sane deadline.
    Hang,
}

impl MockUpstream {
    pub fn responding(address: &str, delay: Duration, response: UpstreamResponse) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            delay,
            behavior: Behavior::Respond(response),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(address: &str, delay: Duration, error: DomainError) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            delay,
            behavior: Behavior::Fail(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hanging(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            delay: Duration::ZERO,
            behavior: Behavior::Hang,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn exchange(&self, _question: &DnsQuestion) -> Result<UpstreamResponse, DomainError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Respond(response) => Ok(response.clone()),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DomainError::QueryTimeout)
            }
        }
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn protocol(&self) -> &str {
        "udp"
    }
}
