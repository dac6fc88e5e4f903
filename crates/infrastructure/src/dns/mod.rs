pub mod cache;
pub mod clock;
pub mod maintenance;
pub mod sort;
pub mod upstream;

pub use cache::{
    CacheMetricsSnapshot, CleanupStats, RawCacheEntry, RefreshRequest, SortedCacheEntry,
    TieredCache,
};
pub use maintenance::CacheMaintenance;
pub use sort::{SortQueue, SortingCoordinator};
pub use upstream::{
    CacheUpdate, HealthSnapshot, HealthStatus, QueryReply, ServerHealth, UpstreamManager,
};
