use super::adaptive::DynamicTuning;
use super::dedup::{DedupKey, RequestDeduplicator};
use super::health::HealthSnapshot;
use super::health_aware::HealthAwareUpstream;
use super::outcome::{CacheUpdateCallback, QueryReply};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};
use velo_dns_domain::{
    DnsQuestion, DomainError, HealthCheckConfig, UpstreamConfig, UpstreamStrategy,
};
use velo_dns_application::Upstream;

/// Orchestrates upstream resolution: wraps servers with health tracking,
/// collapses identical concurrent queries, picks a dispatch strategy, and
/// stamps every resolution with a monotonic version so background cache
/// completions can be ordered against foreground writes.
pub struct UpstreamManager {
    pub(super) servers: Vec<Arc<HealthAwareUpstream>>,
    pub(super) strategy: UpstreamStrategy,
    pub(super) config: UpstreamConfig,
    pub(super) tuning: DynamicTuning,
    dedup: RequestDeduplicator,
    version_counter: AtomicU64,
    pub(super) cache_update: OnceLock<CacheUpdateCallback>,
}

impl UpstreamManager {
    pub fn new(
        upstreams: Vec<Arc<dyn Upstream>>,
        config: UpstreamConfig,
        health_config: HealthCheckConfig,
    ) -> Arc<Self> {
        let servers: Vec<Arc<HealthAwareUpstream>> = upstreams
            .into_iter()
            .map(|u| Arc::new(HealthAwareUpstream::new(u, health_config.clone())))
            .collect();

        let strategy = resolve_strategy(config.strategy, servers.len());
        info!(
            servers = servers.len(),
            strategy = ?strategy,
            "Upstream manager initialized"
        );

        let tuning = DynamicTuning::new(&config);
        Arc::new(Self {
            servers,
            strategy,
            config,
            tuning,
            dedup: RequestDeduplicator::new(),
            version_counter: AtomicU64::new(1),
            cache_update: OnceLock::new(),
        })
    }

    /// Register the consumer of background merge results (parallel
    /// strategy). Without it the merged union is simply discarded.
    pub fn set_cache_update_callback(&self, callback: CacheUpdateCallback) {
        let _ = self.cache_update.set(callback);
    }

    pub fn strategy(&self) -> UpstreamStrategy {
        self.strategy
    }

    pub fn total_server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn healthy_server_count(&self) -> usize {
        self.servers
            .iter()
            .filter(|s| !s.should_skip_temporarily())
            .count()
    }

    pub fn health_snapshots(&self) -> Vec<HealthSnapshot> {
        self.servers.iter().map(|s| s.health().snapshot()).collect()
    }

    pub fn tuning(&self) -> &DynamicTuning {
        &self.tuning
    }

    /// Resolve one question. Concurrent identical questions (same domain,
    /// type, DNSSEC flag) share a single dispatch and its single outcome.
    pub async fn query(&self, question: &DnsQuestion) -> Result<QueryReply, DomainError> {
        let key = DedupKey::new(
            &question.domain,
            question.record_type,
            question.dnssec_ok,
        );
        let (result, shared) = self.dedup.run(key, || self.dispatch(question)).await;
        if shared {
            debug!(domain = %question.domain, "Collapsed into in-flight query");
        }
        result
    }

    async fn dispatch(&self, question: &DnsQuestion) -> Result<QueryReply, DomainError> {
        if self.servers.is_empty() {
            return Err(DomainError::NoUpstreamServers);
        }

        let version = self.next_version();
        let deadline = Duration::from_millis(self.config.timeout_ms.max(1));
        let outcome = match self.strategy {
            UpstreamStrategy::Parallel => {
                timeout(deadline, self.query_parallel(question, version)).await
            }
            UpstreamStrategy::Racing => {
                timeout(deadline, self.query_racing(question, version)).await
            }
            UpstreamStrategy::Sequential => {
                timeout(deadline, self.query_sequential(question, version)).await
            }
            UpstreamStrategy::Random | UpstreamStrategy::Auto => {
                timeout(deadline, self.query_random(question, version)).await
            }
        };

        match outcome {
            Ok(result) => result,
            Err(_) => Err(DomainError::QueryTimeout),
        }
    }

    pub(super) fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Servers ordered for selection: breaker-closed first, by EWMA latency
    /// ascending; breaker-open servers trail so they are only reached when
    /// everything else is exhausted.
    pub(super) fn sorted_healthy_servers(&self) -> ServerList {
        let mut healthy: ServerList = SmallVec::new();
        let mut skipped: ServerList = SmallVec::new();
        for server in &self.servers {
            if server.should_skip_temporarily() {
                skipped.push(Arc::clone(server));
            } else {
                healthy.push(Arc::clone(server));
            }
        }
        healthy.sort_by_key(|s| s.latency());
        healthy.extend(skipped);
        healthy
    }
}

/// Pool snapshots stay on the stack for typical deployments (≤ 8 servers).
pub(super) type ServerList = SmallVec<[Arc<HealthAwareUpstream>; 8]>;

fn resolve_strategy(configured: UpstreamStrategy, server_count: usize) -> UpstreamStrategy {
    match configured {
        UpstreamStrategy::Auto => {
            let resolved = if server_count <= 1 {
                UpstreamStrategy::Sequential
            } else if server_count <= 3 {
                UpstreamStrategy::Racing
            } else {
                UpstreamStrategy::Parallel
            };
            info!(server_count, strategy = ?resolved, "Auto-selected dispatch strategy");
            resolved
        }
        explicit => explicit,
    }
}
