use std::time::{SystemTime, UNIX_EPOCH};

/// Unix time in whole seconds. Cache freshness works on second granularity;
/// sub-second precision only matters for latency measurement, which uses
/// `Instant` directly.
#[inline]
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
