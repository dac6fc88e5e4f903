use std::sync::Mutex;
use std::time::Duration;
use velo_dns_domain::UpstreamConfig;

/// Process-wide view of query latency, feeding the adaptive racing delay
/// and sequential attempt timeout. EWMA for the average, Welford's online
/// algorithm for the variance; samples are halved past a window so old
/// conditions age out.
pub struct DynamicTuning {
    alpha: f64,
    racing_delay_min: Duration,
    racing_delay_max: Duration,
    sequential_timeout_min: Duration,
    sequential_timeout_max: Duration,
    inner: Mutex<TuningInner>,
}

#[derive(Debug, Default)]
struct TuningInner {
    avg_latency: Option<Duration>,
    mean_ms: f64,
    m2: f64,
    samples: u64,
}

const DECAY_WINDOW: u64 = 500;
/// Std-dev weight in the racing-delay formula: the jitterier the network,
/// the earlier the second wave starts.
const STDDEV_K: f64 = 0.5;

impl DynamicTuning {
    pub fn new(config: &UpstreamConfig) -> Self {
        let racing_delay_min = Duration::from_millis(config.racing_delay_min_ms);
        let sequential_timeout_min = Duration::from_millis(config.sequential_timeout_min_ms);
        Self {
            alpha: config.latency_ewma_alpha.clamp(0.01, 1.0),
            racing_delay_min,
            racing_delay_max: Duration::from_millis(config.racing_delay_max_ms)
                .max(racing_delay_min),
            sequential_timeout_min,
            sequential_timeout_max: Duration::from_millis(config.sequential_timeout_max_ms)
                .max(sequential_timeout_min),
            inner: Mutex::new(TuningInner::default()),
        }
    }

    /// Fed by every strategy as queries complete, whatever their path.
    pub fn record_query_latency(&self, latency: Duration) {
        let mut inner = self.inner.lock().expect("tuning lock");

        inner.avg_latency = Some(match inner.avg_latency {
            None => latency,
            Some(prev) => Duration::from_secs_f64(
                (self.alpha * latency.as_secs_f64() + (1.0 - self.alpha) * prev.as_secs_f64())
                    .max(0.0),
            ),
        });

        let sample_ms = latency.as_secs_f64() * 1000.0;
        inner.samples += 1;
        if inner.samples == 1 {
            inner.mean_ms = sample_ms;
            inner.m2 = 0.0;
        } else {
            let delta = sample_ms - inner.mean_ms;
            inner.mean_ms += delta / inner.samples as f64;
            let delta2 = sample_ms - inner.mean_ms;
            inner.m2 += delta * delta2;
        }

        // Halve instead of windowing: recent samples dominate without
        // keeping a history buffer.
        if inner.samples > DECAY_WINDOW {
            inner.samples /= 2;
            inner.m2 /= 2.0;
        }
    }

    pub fn average_latency(&self) -> Duration {
        self.inner
            .lock()
            .expect("tuning lock")
            .avg_latency
            .unwrap_or(Duration::from_millis(200))
    }

    pub fn latency_std_dev(&self) -> Duration {
        let inner = self.inner.lock().expect("tuning lock");
        if inner.samples < 2 {
            return Duration::ZERO;
        }
        let variance = inner.m2 / inner.samples as f64;
        Duration::from_secs_f64((variance.max(0.0)).sqrt() / 1000.0)
    }

    /// How long the primary gets before the second wave:
    /// `clamp(avg − K·stddev, min, max)`. A stable network buys the best
    /// server more headroom; a jittery one starts racing almost at once.
    pub fn racing_delay(&self) -> Duration {
        let avg = self.average_latency();
        let stddev = self.latency_std_dev();
        let base = avg.saturating_sub(stddev.mul_f64(STDDEV_K));
        base.clamp(self.racing_delay_min, self.racing_delay_max)
    }

    /// Per-attempt budget for the sequential strategy: `clamp(1.5·avg,
    /// min, max)` instead of a hand-tuned constant that rots as the network
    /// changes.
    pub fn sequential_timeout(&self) -> Duration {
        let avg = self.average_latency();
        avg.mul_f64(1.5)
            .clamp(self.sequential_timeout_min, self.sequential_timeout_max)
    }

    /// Wave shape for the racing strategy: more simultaneous starts and a
    /// shorter stagger when the network is jittery or the pool is large.
    pub fn racing_batch_params(&self, remaining: usize) -> (usize, Duration) {
        let stddev = self.latency_std_dev();
        let mut batch_size = 2;
        let mut stagger = Duration::from_millis(20);
        if stddev > Duration::from_millis(50) {
            batch_size = 3;
            stagger = Duration::from_millis(15);
        }
        if remaining > 5 {
            batch_size = (batch_size + 1).min(4);
        }
        (batch_size, stagger)
    }
}
