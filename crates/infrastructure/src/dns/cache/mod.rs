mod cleanup;
mod entry;
mod error_tier;
mod expiry;
mod key;
mod metrics;
mod persistence;
mod sorting;
mod storage;

pub use cleanup::CleanupStats;
pub use entry::{
    ErrorCacheEntry, MessageCacheEntry, PersistedCacheEntry, RawCacheEntry, SortedCacheEntry,
};
pub use key::CacheKey;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use sorting::SortingState;
pub use storage::{RawWrite, RefreshRequest, TieredCache};
