use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStrategy {
    /// Pick from the server count at startup.
    Auto,
    /// Fan out to every server; first answer wins, the rest merge into the
    /// cache in the background.
    Parallel,
    /// Best server first, staggered second wave after an adaptive delay.
    Racing,
    /// Health-ordered, one server at a time.
    Sequential,
    /// Shuffled one-shot tries; low-complexity fallback.
    Random,
}

impl Default for UpstreamStrategy {
    fn default() -> Self {
        UpstreamStrategy::Auto
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub strategy: UpstreamStrategy,

    /// Overall deadline for one orchestrated query.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Per-server attempt timeout where a strategy does not derive its own.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Concurrency cap for the parallel fan-out.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Total servers the racing strategy may have in flight.
    #[serde(default = "default_racing_max_concurrent")]
    pub racing_max_concurrent: usize,

    /// Clamp bounds for the adaptive racing delay.
    #[serde(default = "default_racing_delay_min_ms")]
    pub racing_delay_min_ms: u64,

    #[serde(default = "default_racing_delay_max_ms")]
    pub racing_delay_max_ms: u64,

    /// Clamp bounds for the adaptive sequential attempt timeout.
    #[serde(default = "default_sequential_timeout_min_ms")]
    pub sequential_timeout_min_ms: u64,

    #[serde(default = "default_sequential_timeout_max_ms")]
    pub sequential_timeout_max_ms: u64,

    /// Smoothing factor of the global query-latency EWMA driving the
    /// adaptive parameters above.
    #[serde(default = "default_ewma_alpha")]
    pub latency_ewma_alpha: f64,

    /// Hard deadline for background response collection (parallel merge).
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            strategy: UpstreamStrategy::default(),
            timeout_ms: default_timeout_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            concurrency: default_concurrency(),
            racing_max_concurrent: default_racing_max_concurrent(),
            racing_delay_min_ms: default_racing_delay_min_ms(),
            racing_delay_max_ms: default_racing_delay_max_ms(),
            sequential_timeout_min_ms: default_sequential_timeout_min_ms(),
            sequential_timeout_max_ms: default_sequential_timeout_max_ms(),
            latency_ewma_alpha: default_ewma_alpha(),
            collect_timeout_ms: default_collect_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_attempt_timeout_ms() -> u64 {
    2000
}

fn default_concurrency() -> usize {
    3
}

fn default_racing_max_concurrent() -> usize {
    4
}

fn default_racing_delay_min_ms() -> u64 {
    20
}

fn default_racing_delay_max_ms() -> u64 {
    200
}

fn default_sequential_timeout_min_ms() -> u64 {
    500
}

fn default_sequential_timeout_max_ms() -> u64 {
    2000
}

fn default_ewma_alpha() -> f64 {
    0.2
}

fn default_collect_timeout_ms() -> u64 {
    3000
}
