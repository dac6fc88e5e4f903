/// Hot-domain accounting consumed by the cache: the prefetcher reports which
/// domains are popular so eviction can protect them, and learns about
/// accesses to keep its ranking current.
pub trait HotDomainTracker: Send + Sync {
    fn is_top_domain(&self, domain: &str) -> bool;

    fn record_access(&self, domain: &str, ttl: u32);
}
