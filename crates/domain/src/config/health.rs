use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Consecutive failures before a healthy server is degraded.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive failures before the circuit breaker opens.
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    /// Base of the breaker backoff window (`base * 2^attempts`).
    #[serde(default = "default_backoff_base")]
    pub circuit_breaker_base_secs: u64,

    /// Cap on the backoff window.
    #[serde(default = "default_backoff_cap")]
    pub circuit_breaker_cap_secs: u64,

    /// Consecutive successes before a degraded/unhealthy server recovers.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// EWMA smoothing factor for per-server latency.
    #[serde(default = "default_latency_alpha")]
    pub latency_ewma_alpha: f64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_base_secs: default_backoff_base(),
            circuit_breaker_cap_secs: default_backoff_cap(),
            success_threshold: default_success_threshold(),
            latency_ewma_alpha: default_latency_alpha(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    30
}

fn default_backoff_cap() -> u64 {
    300
}

fn default_success_threshold() -> u32 {
    2
}

fn default_latency_alpha() -> f64 {
    0.3
}
