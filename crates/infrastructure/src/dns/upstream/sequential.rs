use super::manager::UpstreamManager;
use super::outcome::QueryReply;
use super::parallel::DEFAULT_NEGATIVE_TTL_SECS;
use std::time::Instant;
use tracing::{debug, warn};
use velo_dns_domain::{DnsQuestion, DomainError, ResponseCode};

impl UpstreamManager {
    /// Try servers one at a time in health/latency order, each attempt
    /// bounded by the adaptive timeout. NXDOMAIN is a definitive answer and
    /// returns immediately; an empty NOERROR counts as a failure and the
    /// loop moves on. Breaker-open servers are skipped without spending
    /// their timeout.
    pub(super) async fn query_sequential(
        &self,
        question: &DnsQuestion,
        version: u64,
    ) -> Result<QueryReply, DomainError> {
        let servers = self.sorted_healthy_servers();
        if servers.is_empty() {
            return Err(DomainError::NoUpstreamServers);
        }

        let attempt_timeout = self.tuning.sequential_timeout();
        let started = Instant::now();

        debug!(
            strategy = "sequential",
            servers = servers.len(),
            domain = %question.domain,
            attempt_timeout_ms = attempt_timeout.as_millis() as u64,
            "Trying servers in health order"
        );

        let mut first_error: Option<DomainError> = None;
        let mut last_dns_error: Option<DomainError> = None;

        for (position, server) in servers.iter().enumerate() {
            if server.should_skip_temporarily() {
                debug!(server = %server.address(), position, "Skipping breaker-open server");
                continue;
            }

            match server.exchange(question, attempt_timeout).await {
                Err(err) => {
                    debug!(
                        server = %server.address(),
                        position,
                        error = %err,
                        "Attempt failed, trying next"
                    );
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    continue;
                }
                Ok(response) => {
                    if response.is_nxdomain() {
                        debug!(server = %server.address(), "NXDOMAIN, returning immediately");
                        self.tuning.record_query_latency(started.elapsed());
                        return Ok(QueryReply::negative(
                            ResponseCode::NxDomain,
                            response.negative_ttl(DEFAULT_NEGATIVE_TTL_SECS),
                            version,
                        ));
                    }

                    if response.rcode != ResponseCode::NoError {
                        debug!(
                            server = %server.address(),
                            rcode = %response.rcode,
                            "Error rcode, trying next"
                        );
                        last_dns_error = Some(DomainError::UpstreamRcode(response.rcode));
                        continue;
                    }

                    let reply = QueryReply::from_response(&response, version);
                    if reply.records.is_empty() {
                        debug!(server = %server.address(), "Empty response, trying next");
                        last_dns_error = Some(DomainError::EmptyResponse);
                        continue;
                    }

                    debug!(
                        server = %server.address(),
                        records = reply.records.len(),
                        "Sequential attempt succeeded"
                    );
                    self.tuning.record_query_latency(started.elapsed());
                    return Ok(reply);
                }
            }
        }

        warn!(domain = %question.domain, "All sequential attempts failed");
        Err(last_dns_error
            .or(first_error)
            .unwrap_or(DomainError::AllServersFailed))
    }
}
