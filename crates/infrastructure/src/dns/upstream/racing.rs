use super::health_aware::HealthAwareUpstream;
use super::manager::UpstreamManager;
use super::outcome::QueryReply;
use super::parallel::DEFAULT_NEGATIVE_TTL_SECS;
use super::health::HealthStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use velo_dns_domain::{DnsQuestion, DomainError, ResponseCode, UpstreamResponse};

#[derive(Debug)]
struct RaceAttempt {
    primary: bool,
    outcome: Result<QueryReply, DomainError>,
}

/// Success for racing purposes is an answer with data or a definitive
/// NXDOMAIN; an empty NOERROR keeps the race going.
fn classify(
    result: Result<UpstreamResponse, DomainError>,
    version: u64,
) -> Result<QueryReply, DomainError> {
    match result {
        Err(err) => Err(err),
        Ok(response) => {
            if response.is_nxdomain() {
                return Ok(QueryReply::negative(
                    ResponseCode::NxDomain,
                    response.negative_ttl(DEFAULT_NEGATIVE_TTL_SECS),
                    version,
                ));
            }
            if response.rcode != ResponseCode::NoError {
                return Err(DomainError::UpstreamRcode(response.rcode));
            }
            let reply = QueryReply::from_response(&response, version);
            if reply.has_data() {
                Ok(reply)
            } else {
                Err(DomainError::EmptyResponse)
            }
        }
    }
}

fn spawn_race_attempt(
    server: Arc<HealthAwareUpstream>,
    question: DnsQuestion,
    attempt_timeout: Duration,
    version: u64,
    primary: bool,
    result_tx: mpsc::Sender<RaceAttempt>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            result = server.exchange(&question, attempt_timeout) => classify(result, version),
            _ = cancel.cancelled() => return,
        };
        let _ = result_tx.send(RaceAttempt { primary, outcome }).await;
    });
}

impl UpstreamManager {
    /// Give the best server (by EWMA) a head start; if it neither answers
    /// nor fails within the adaptive delay, launch a staggered wave of
    /// alternates. A transport-class primary error triggers the wave
    /// immediately instead of waiting out the delay.
    pub(super) async fn query_racing(
        &self,
        question: &DnsQuestion,
        version: u64,
    ) -> Result<QueryReply, DomainError> {
        let servers = self.sorted_healthy_servers();
        if servers.is_empty() {
            return Err(DomainError::NoUpstreamServers);
        }

        let race_delay = self.tuning.racing_delay();
        let max_concurrent = self.config.racing_max_concurrent.max(1);
        let attempt_timeout = Duration::from_millis(self.config.attempt_timeout_ms.max(1));
        let started = Instant::now();

        debug!(
            strategy = "racing",
            domain = %question.domain,
            delay_ms = race_delay.as_millis() as u64,
            max_concurrent,
            "Starting race"
        );

        let cancel = CancellationToken::new();
        let (result_tx, mut result_rx) = mpsc::channel::<RaceAttempt>(servers.len().max(1));

        spawn_race_attempt(
            Arc::clone(&servers[0]),
            question.clone(),
            attempt_timeout,
            version,
            true,
            result_tx.clone(),
            cancel.clone(),
        );
        let mut outstanding = 1usize;
        let mut wave_launched = false;
        let mut first_error: Option<DomainError> = None;
        let mut last_dns_error: Option<DomainError> = None;

        let delay = sleep(race_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                attempt = result_rx.recv() => {
                    let Some(attempt) = attempt else { break };
                    outstanding -= 1;
                    match attempt.outcome {
                        Ok(reply) => {
                            cancel.cancel();
                            self.tuning.record_query_latency(started.elapsed());
                            debug!(
                                domain = %question.domain,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Race won"
                            );
                            return Ok(reply);
                        }
                        Err(err) => {
                            if attempt.primary && !wave_launched && err.is_network_error() {
                                // Early trigger: the primary is unreachable,
                                // waiting out the delay buys nothing.
                                debug!(domain = %question.domain, error = %err, "Early trigger");
                                wave_launched = true;
                                outstanding += self.launch_racing_wave(
                                    &servers,
                                    question,
                                    attempt_timeout,
                                    version,
                                    max_concurrent,
                                    &result_tx,
                                    &cancel,
                                );
                            }
                            if matches!(err, DomainError::UpstreamRcode(_)) {
                                last_dns_error = Some(err.clone());
                            }
                            if first_error.is_none() {
                                first_error = Some(err);
                            }
                            if outstanding == 0 && wave_launched {
                                break;
                            }
                        }
                    }
                }
                _ = &mut delay, if !wave_launched => {
                    wave_launched = true;
                    outstanding += self.launch_racing_wave(
                        &servers,
                        question,
                        attempt_timeout,
                        version,
                        max_concurrent,
                        &result_tx,
                        &cancel,
                    );
                    if outstanding == 0 {
                        break;
                    }
                }
            }
        }

        Err(last_dns_error
            .or(first_error)
            .unwrap_or(DomainError::AllServersFailed))
    }

    /// Start the secondary wave: breaker-open servers are skipped entirely,
    /// the rest launch in batches whose size and spacing follow the
    /// observed latency jitter. Returns how many attempts were started.
    #[allow(clippy::too_many_arguments)]
    fn launch_racing_wave(
        &self,
        servers: &[Arc<HealthAwareUpstream>],
        question: &DnsQuestion,
        attempt_timeout: Duration,
        version: u64,
        max_concurrent: usize,
        result_tx: &mpsc::Sender<RaceAttempt>,
        cancel: &CancellationToken,
    ) -> usize {
        let wave: Vec<Arc<HealthAwareUpstream>> = servers
            .iter()
            .skip(1)
            .filter(|server| server.status() != HealthStatus::Unhealthy)
            .take(max_concurrent.saturating_sub(1))
            .cloned()
            .collect();

        if wave.is_empty() {
            return 0;
        }

        let (batch_size, stagger) = self.tuning.racing_batch_params(wave.len());
        debug!(
            wave = wave.len(),
            batch_size,
            stagger_ms = stagger.as_millis() as u64,
            "Launching secondary wave"
        );

        let launched = wave.len();
        let question = question.clone();
        let result_tx = result_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut first_batch = true;
            for batch in wave.chunks(batch_size.max(1)) {
                if !first_batch {
                    tokio::select! {
                        _ = sleep(stagger) => {}
                        // Race already decided; the rest never start.
                        _ = cancel.cancelled() => return,
                    }
                }
                first_batch = false;
                for server in batch {
                    spawn_race_attempt(
                        Arc::clone(server),
                        question.clone(),
                        attempt_timeout,
                        version,
                        false,
                        result_tx.clone(),
                        cancel.clone(),
                    );
                }
            }
        });

        launched
    }
}
