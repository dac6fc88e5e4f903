use super::manager::UpstreamManager;
use super::outcome::{merge_and_deduplicate, CacheUpdate, CacheUpdateCallback, QueryReply};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};
use velo_dns_domain::{DnsQuestion, DomainError, RecordType, ResponseCode};

pub(super) const DEFAULT_NEGATIVE_TTL_SECS: u32 = 300;

#[derive(Debug, Clone)]
struct ServerAttempt {
    index: usize,
    address: Arc<str>,
    outcome: Result<QueryReply, DomainError>,
}

impl UpstreamManager {
    /// Fan out to every server (bounded by the concurrency semaphore). The
    /// first answer with data (or a definitive NXDOMAIN) goes straight
    /// back to the caller; the rest keep running under their own budget and
    /// merge into a cache update. Caller-visible latency is the fastest
    /// healthy server; cache consistency is the union of everyone who
    /// answered in time.
    pub(super) async fn query_parallel(
        &self,
        question: &DnsQuestion,
        version: u64,
    ) -> Result<QueryReply, DomainError> {
        let servers = self.sorted_healthy_servers();
        if servers.is_empty() {
            return Err(DomainError::NoUpstreamServers);
        }

        debug!(
            strategy = "parallel",
            servers = servers.len(),
            domain = %question.domain,
            "Fanning out"
        );

        let started = Instant::now();
        let collect_budget = Duration::from_millis(self.config.collect_timeout_ms.max(1));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let (result_tx, mut result_rx) = mpsc::channel::<ServerAttempt>(servers.len());
        let (fast_tx, mut fast_rx) = mpsc::channel::<ServerAttempt>(1);
        let fast_claimed = Arc::new(AtomicBool::new(false));

        for (index, server) in servers.iter().enumerate() {
            let server = Arc::clone(server);
            let question = question.clone();
            let result_tx = result_tx.clone();
            let fast_tx = fast_tx.clone();
            let fast_claimed = Arc::clone(&fast_claimed);
            let semaphore = Arc::clone(&semaphore);
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                let outcome = match server.exchange(&question, collect_budget).await {
                    Ok(response) => {
                        if response.is_nxdomain() {
                            Ok(QueryReply::negative(
                                ResponseCode::NxDomain,
                                response.negative_ttl(DEFAULT_NEGATIVE_TTL_SECS),
                                version,
                            ))
                        } else if response.rcode == ResponseCode::NoError {
                            Ok(QueryReply::from_response(&response, version))
                        } else {
                            Err(DomainError::UpstreamRcode(response.rcode))
                        }
                    }
                    Err(err) => Err(err),
                };

                let attempt = ServerAttempt {
                    index,
                    address: Arc::from(server.address()),
                    outcome,
                };

                let is_fast = matches!(
                    &attempt.outcome,
                    Ok(reply) if reply.has_data() || reply.rcode.is_definitive_negative()
                );
                if is_fast
                    && fast_claimed
                        .compare_exchange(
                            false,
                            true,
                            AtomicOrdering::AcqRel,
                            AtomicOrdering::Acquire,
                        )
                        .is_ok()
                {
                    let _ = fast_tx.try_send(attempt.clone());
                }
                let _ = result_tx.send(attempt).await;
            });
        }
        drop(result_tx);
        drop(fast_tx);

        match fast_rx.recv().await {
            Some(attempt) => {
                let Ok(reply) = attempt.outcome else {
                    return Err(DomainError::AllServersFailed);
                };
                debug!(
                    server = %attempt.address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Fast response"
                );
                self.tuning.record_query_latency(started.elapsed());

                // Background collection outlives the caller on purpose:
                // answering fast must not truncate what reaches the cache.
                let callback = self.cache_update.get().cloned();
                let domain = Arc::clone(&question.domain);
                let record_type = question.record_type;
                let fast = reply.clone();
                let fast_index = attempt.index;
                tokio::spawn(collect_remaining(
                    collect_budget,
                    callback,
                    domain,
                    record_type,
                    version,
                    fast,
                    fast_index,
                    result_rx,
                ));

                Ok(reply)
            }
            None => {
                // Every task finished without a usable answer; surface the
                // most meaningful error (DNS-semantic over transport).
                let mut first_error: Option<DomainError> = None;
                let mut last_dns_error: Option<DomainError> = None;
                while let Some(attempt) = result_rx.recv().await {
                    if let Err(err) = attempt.outcome {
                        if matches!(err, DomainError::UpstreamRcode(_)) {
                            last_dns_error = Some(err.clone());
                        }
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
                Err(last_dns_error
                    .or(first_error)
                    .unwrap_or(DomainError::AllServersFailed))
            }
        }
    }
}

/// Drain the stragglers and publish the merged union. Runs detached from
/// the caller; its only deadline is the collect budget.
#[allow(clippy::too_many_arguments)]
async fn collect_remaining(
    budget: Duration,
    callback: Option<CacheUpdateCallback>,
    domain: Arc<str>,
    record_type: RecordType,
    version: u64,
    fast: QueryReply,
    fast_index: usize,
    mut result_rx: mpsc::Receiver<ServerAttempt>,
) {
    let mut successes: Vec<QueryReply> = vec![fast];

    let drain = async {
        while let Some(attempt) = result_rx.recv().await {
            if attempt.index == fast_index {
                continue;
            }
            match attempt.outcome {
                Ok(reply) if reply.has_data() => successes.push(reply),
                Ok(_) => {}
                Err(err) => {
                    debug!(server = %attempt.address, error = %err, "Straggler failed")
                }
            }
        }
    };
    if timeout(budget, drain).await.is_err() {
        warn!(domain = %domain, version, "Background collection hit its hard deadline");
    }

    if successes.len() <= 1 {
        return;
    }

    let refs: Vec<&QueryReply> = successes.iter().collect();
    let merged = merge_and_deduplicate(&refs);
    let min_ttl = successes
        .iter()
        .map(|reply| reply.ttl)
        .min()
        .unwrap_or(successes[0].ttl);
    let ips = merged.iter().filter_map(|r| r.data.as_ip()).collect();
    let cnames = successes[0].cnames.clone();

    debug!(
        domain = %domain,
        sources = successes.len(),
        merged = merged.len(),
        version,
        "Merged background responses"
    );

    if let Some(callback) = callback {
        callback(CacheUpdate {
            domain,
            record_type,
            records: merged,
            ips,
            cnames,
            ttl: min_ttl,
            version,
        });
    }
}
