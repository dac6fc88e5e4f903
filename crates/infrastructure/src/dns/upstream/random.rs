use super::manager::UpstreamManager;
use super::outcome::QueryReply;
use super::parallel::DEFAULT_NEGATIVE_TTL_SECS;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use velo_dns_domain::{DnsQuestion, DomainError, ResponseCode};

impl UpstreamManager {
    /// Shuffle the pool and try each server exactly once with the full
    /// per-attempt timeout. Same result semantics as sequential, minus the
    /// health ordering. The low-complexity fallback for tiny pools.
    pub(super) async fn query_random(
        &self,
        question: &DnsQuestion,
        version: u64,
    ) -> Result<QueryReply, DomainError> {
        if self.servers.is_empty() {
            return Err(DomainError::NoUpstreamServers);
        }

        let mut order: Vec<usize> = (0..self.servers.len()).collect();
        fastrand::shuffle(&mut order);

        let attempt_timeout = Duration::from_millis(self.config.attempt_timeout_ms.max(1));
        let started = Instant::now();

        debug!(
            strategy = "random",
            servers = order.len(),
            domain = %question.domain,
            "Trying servers in shuffled order"
        );

        let mut first_error: Option<DomainError> = None;
        let mut last_dns_error: Option<DomainError> = None;

        for (attempt, index) in order.into_iter().enumerate() {
            let server = &self.servers[index];

            if server.should_skip_temporarily() {
                debug!(server = %server.address(), "Skipping breaker-open server");
                continue;
            }

            match server.exchange(question, attempt_timeout).await {
                Err(err) => {
                    debug!(
                        server = %server.address(),
                        attempt,
                        error = %err,
                        "Attempt failed"
                    );
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Ok(response) => {
                    if response.is_nxdomain() {
                        self.tuning.record_query_latency(started.elapsed());
                        return Ok(QueryReply::negative(
                            ResponseCode::NxDomain,
                            response.negative_ttl(DEFAULT_NEGATIVE_TTL_SECS),
                            version,
                        ));
                    }

                    if response.rcode != ResponseCode::NoError {
                        last_dns_error = Some(DomainError::UpstreamRcode(response.rcode));
                        continue;
                    }

                    let reply = QueryReply::from_response(&response, version);
                    if reply.records.is_empty() {
                        last_dns_error = Some(DomainError::EmptyResponse);
                        continue;
                    }

                    self.tuning.record_query_latency(started.elapsed());
                    return Ok(reply);
                }
            }
        }

        warn!(domain = %question.domain, "All randomized attempts failed");
        Err(last_dns_error
            .or(first_error)
            .unwrap_or(DomainError::AllServersFailed))
    }
}
