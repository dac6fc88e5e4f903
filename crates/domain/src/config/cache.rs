use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Upper bound on raw-tier entries; the pressure ratio is computed
    /// against this.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Pressure ratio (live / max) at or above which cleanup turns
    /// aggressive.
    #[serde(default = "default_pressure_threshold")]
    pub eviction_pressure_threshold: f64,

    /// Keep expired entries around while pressure is low so they stay
    /// servable under stale-while-revalidate.
    #[serde(default = "default_keep_expired")]
    pub keep_expired_entries: bool,

    /// Age past expiry after which an entry is reclaimed even under low
    /// pressure (when `keep_expired_entries` is off).
    #[serde(default = "default_ancient_grace")]
    pub ancient_grace_secs: u64,

    /// Hard per-pass budgets so cleanup never becomes a query-path latency
    /// spike.
    #[serde(default = "default_cleanup_max_entries")]
    pub cleanup_max_entries: usize,

    #[serde(default = "default_cleanup_max_duration_ms")]
    pub cleanup_max_duration_ms: u64,

    /// Seconds between maintenance passes.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Capacity of the channel feeding the expiry-index worker. Overflow
    /// drops the event (the entry is still reclaimed by later passes).
    #[serde(default = "default_expiry_queue_size")]
    pub expiry_queue_size: usize,

    /// Capacity of the stale-refresh request channel.
    #[serde(default = "default_refresh_queue_size")]
    pub refresh_queue_size: usize,

    /// Memory budget for the validated-message tier; 0 disables it.
    #[serde(default = "default_message_cache_mb")]
    pub message_cache_mb: usize,

    /// Cap applied to message-tier TTLs; 0 means "record TTL only".
    #[serde(default)]
    pub message_cache_ttl_secs: u32,

    /// Negative TTL used when an NXDOMAIN carries no SOA.
    #[serde(default = "default_negative_ttl")]
    pub negative_ttl_secs: u32,

    /// TTL assigned to entries restored from disk.
    #[serde(default = "default_persisted_ttl")]
    pub persisted_entry_ttl_secs: u32,

    /// Skip hot domains (per the prefetch tracker) in the low-pressure
    /// ancient sweep.
    #[serde(default = "default_protect_hot_domains")]
    pub protect_hot_domains: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            eviction_pressure_threshold: default_pressure_threshold(),
            keep_expired_entries: default_keep_expired(),
            ancient_grace_secs: default_ancient_grace(),
            cleanup_max_entries: default_cleanup_max_entries(),
            cleanup_max_duration_ms: default_cleanup_max_duration_ms(),
            cleanup_interval_secs: default_cleanup_interval(),
            expiry_queue_size: default_expiry_queue_size(),
            refresh_queue_size: default_refresh_queue_size(),
            message_cache_mb: default_message_cache_mb(),
            message_cache_ttl_secs: 0,
            negative_ttl_secs: default_negative_ttl(),
            persisted_entry_ttl_secs: default_persisted_ttl(),
            protect_hot_domains: default_protect_hot_domains(),
        }
    }
}

fn default_max_entries() -> usize {
    100_000
}

fn default_pressure_threshold() -> f64 {
    0.9
}

fn default_keep_expired() -> bool {
    true
}

fn default_ancient_grace() -> u64 {
    86_400
}

fn default_cleanup_max_entries() -> usize {
    200
}

fn default_cleanup_max_duration_ms() -> u64 {
    10
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_expiry_queue_size() -> usize {
    1000
}

fn default_refresh_queue_size() -> usize {
    256
}

fn default_message_cache_mb() -> usize {
    8
}

fn default_negative_ttl() -> u32 {
    300
}

fn default_persisted_ttl() -> u32 {
    300
}

fn default_protect_hot_domains() -> bool {
    true
}
