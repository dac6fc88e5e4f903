use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use velo_dns_domain::HealthCheckConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Failing but still queried; sorts behind healthy servers.
    Degraded,
    /// Circuit breaker open; skipped until the backoff window elapses.
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug)]
struct HealthInner {
    status: HealthStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_successes: u64,
    total_failures: u64,
    last_failure_at: Option<Instant>,
    breaker_opened_at: Option<Instant>,
    /// Failed half-open probes since the breaker first opened; exponent of
    /// the backoff window.
    recovery_attempts: u32,
    ewma_latency: Option<Duration>,
}

/// Success/failure/latency state machine for one upstream server. One
/// instance per configured server, created at startup and mutated for the
/// server's lifetime; each is locked independently.
pub struct ServerHealth {
    address: Arc<str>,
    config: HealthCheckConfig,
    inner: Mutex<HealthInner>,
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub address: Arc<str>,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub ewma_latency: Option<Duration>,
    pub seconds_since_last_failure: Option<u64>,
    pub breaker_remaining: Option<Duration>,
}

impl ServerHealth {
    pub fn new(address: impl Into<Arc<str>>, config: HealthCheckConfig) -> Self {
        Self {
            address: address.into(),
            config,
            inner: Mutex::new(HealthInner {
                status: HealthStatus::Healthy,
                consecutive_failures: 0,
                consecutive_successes: 0,
                total_successes: 0,
                total_failures: 0,
                last_failure_at: None,
                breaker_opened_at: None,
                recovery_attempts: 0,
                ewma_latency: None,
            }),
        }
    }

    pub fn address(&self) -> &Arc<str> {
        &self.address
    }

    pub fn mark_success(&self) {
        let mut inner = self.inner.lock().expect("health lock");
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;
        inner.total_successes += 1;

        if inner.consecutive_successes >= self.config.success_threshold
            && inner.status != HealthStatus::Healthy
        {
            info!(server = %self.address, "Upstream recovered, marking healthy");
            inner.status = HealthStatus::Healthy;
            inner.consecutive_successes = 0;
            inner.recovery_attempts = 0;
            inner.breaker_opened_at = None;
        }
    }

    pub fn mark_failure(&self) {
        let mut inner = self.inner.lock().expect("health lock");
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        inner.total_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        if inner.consecutive_failures >= self.config.circuit_breaker_threshold {
            if inner.status != HealthStatus::Unhealthy {
                warn!(
                    server = %self.address,
                    failures = inner.consecutive_failures,
                    "Circuit breaker opened"
                );
                inner.status = HealthStatus::Unhealthy;
            } else {
                // A failure while already open is a failed half-open probe:
                // re-open with a doubled window.
                inner.recovery_attempts = inner.recovery_attempts.saturating_add(1);
                debug!(
                    server = %self.address,
                    attempts = inner.recovery_attempts,
                    "Half-open probe failed, breaker re-opened"
                );
            }
            inner.breaker_opened_at = Some(Instant::now());
        } else if inner.consecutive_failures >= self.config.failure_threshold
            && inner.status == HealthStatus::Healthy
        {
            warn!(server = %self.address, "Upstream degraded");
            inner.status = HealthStatus::Degraded;
        }
    }

    /// Timeouts don't advance the breaker (a slow server is not a dead
    /// one), but the latency penalty pushes it to the back of
    /// health-ordered selection.
    pub fn mark_timeout(&self, penalty: Duration) {
        let mut inner = self.inner.lock().expect("health lock");
        inner.ewma_latency = Some(Self::ewma(
            self.config.latency_ewma_alpha,
            penalty,
            inner.ewma_latency,
        ));
    }

    pub fn record_latency(&self, sample: Duration) {
        let mut inner = self.inner.lock().expect("health lock");
        inner.ewma_latency = Some(Self::ewma(
            self.config.latency_ewma_alpha,
            sample,
            inner.ewma_latency,
        ));
    }

    fn ewma(alpha: f64, sample: Duration, previous: Option<Duration>) -> Duration {
        match previous {
            None => sample,
            Some(prev) => {
                let blended =
                    alpha * sample.as_secs_f64() + (1.0 - alpha) * prev.as_secs_f64();
                Duration::from_secs_f64(blended.max(0.0))
            }
        }
    }

    /// True only while the breaker is open and its backoff window
    /// (`base * 2^attempts`, capped) has not elapsed. Once it has, the next
    /// query is the half-open probe.
    pub fn should_skip_temporarily(&self) -> bool {
        let inner = self.inner.lock().expect("health lock");
        if inner.status != HealthStatus::Unhealthy {
            return false;
        }
        match inner.breaker_opened_at {
            Some(opened_at) => opened_at.elapsed() < self.backoff_window(inner.recovery_attempts),
            None => false,
        }
    }

    fn backoff_window(&self, attempts: u32) -> Duration {
        let base = self.config.circuit_breaker_base_secs.max(1);
        let cap = self.config.circuit_breaker_cap_secs.max(base);
        let window = base.saturating_mul(1u64 << attempts.min(16));
        Duration::from_secs(window.min(cap))
    }

    pub fn status(&self) -> HealthStatus {
        self.inner.lock().expect("health lock").status
    }

    /// EWMA latency; servers with no samples yet sort first.
    pub fn latency(&self) -> Duration {
        self.inner
            .lock()
            .expect("health lock")
            .ewma_latency
            .unwrap_or(Duration::ZERO)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.lock().expect("health lock");
        let breaker_remaining = match (inner.status, inner.breaker_opened_at) {
            (HealthStatus::Unhealthy, Some(opened_at)) => Some(
                self.backoff_window(inner.recovery_attempts)
                    .saturating_sub(opened_at.elapsed()),
            ),
            _ => None,
        };
        HealthSnapshot {
            address: Arc::clone(&self.address),
            status: inner.status,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            ewma_latency: inner.ewma_latency,
            seconds_since_last_failure: inner.last_failure_at.map(|at| at.elapsed().as_secs()),
            breaker_remaining,
        }
    }

    /// Manual recovery hook.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("health lock");
        inner.status = HealthStatus::Healthy;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.last_failure_at = None;
        inner.breaker_opened_at = None;
        inner.recovery_attempts = 0;
    }
}
