mod helpers;

use helpers::*;
use std::time::Duration;
use velo_dns_domain::{RecordType, ResponseCode};
use velo_dns_infrastructure::dns::cache::{SortedCacheEntry, TieredCache};

#[test]
fn raw_get_returns_entries_regardless_of_freshness() {
    let cache = TieredCache::new(small_cache_config(100));

    cache.set_raw("stale.example", RecordType::A, raw_write(&["1.2.3.4"], 0), 1);

    // TTL 0 means the entry expired the instant it was written, but the raw
    // tier still serves it; freshness is the caller's decision.
    let entry = cache.get_raw("stale.example", RecordType::A).unwrap();
    assert!(entry.is_expired());
    assert_eq!(entry.ips, vec![ip("1.2.3.4")]);
}

#[test]
fn raw_expiry_is_monotonic() {
    let cache = TieredCache::new(small_cache_config(100));
    cache.set_raw("mono.example", RecordType::A, raw_write(&["1.2.3.4"], 0), 1);

    let entry = cache.get_raw("mono.example", RecordType::A).unwrap();
    assert!(entry.is_expired());
    std::thread::sleep(Duration::from_millis(50));
    // Once expired, an entry never reads as fresh again without a new Set.
    assert!(entry.is_expired());
    assert!(cache
        .get_raw("mono.example", RecordType::A)
        .unwrap()
        .is_expired());
}

#[test]
fn stale_raw_write_is_dropped() {
    let cache = TieredCache::new(small_cache_config(100));

    assert!(cache.set_raw("v.example", RecordType::A, raw_write(&["1.1.1.1"], 300), 5));

    // A background completion stamped before the live write must not win.
    assert!(!cache.set_raw("v.example", RecordType::A, raw_write(&["9.9.9.9"], 300), 3));
    let entry = cache.get_raw("v.example", RecordType::A).unwrap();
    assert_eq!(entry.ips, vec![ip("1.1.1.1")]);
    assert_eq!(entry.version, 5);
    assert_eq!(cache.metrics().stale_writes_dropped, 1);

    // Equal or newer versions replace as usual.
    assert!(cache.set_raw("v.example", RecordType::A, raw_write(&["2.2.2.2"], 300), 5));
    assert!(cache.set_raw("v.example", RecordType::A, raw_write(&["3.3.3.3"], 300), 6));
    let entry = cache.get_raw("v.example", RecordType::A).unwrap();
    assert_eq!(entry.ips, vec![ip("3.3.3.3")]);
}

#[test]
fn sorted_tier_treats_invalid_and_expired_as_absent() {
    let cache = TieredCache::new(small_cache_config(100));

    let entry = SortedCacheEntry::new(vec![ip("1.1.1.1"), ip("2.2.2.2")], vec![5, 12], 300);
    cache.set_sorted("fast.example", RecordType::A, entry.clone());
    let fetched = cache.get_sorted("fast.example", RecordType::A).unwrap();
    assert_eq!(fetched.ips, entry.ips);
    assert_eq!(fetched.rtts_ms, entry.rtts_ms);

    let mut invalid = entry;
    invalid.is_valid = false;
    cache.set_sorted("fast.example", RecordType::A, invalid);
    assert!(cache.get_sorted("fast.example", RecordType::A).is_none());
}

#[test]
fn error_tier_expires_on_read() {
    let cache = TieredCache::new(small_cache_config(100));

    cache.set_error("nx.example", RecordType::A, ResponseCode::NxDomain, 1);
    let entry = cache.get_error("nx.example", RecordType::A).unwrap();
    assert_eq!(entry.rcode, ResponseCode::NxDomain);
    assert_eq!(cache.error_len(), 1);

    std::thread::sleep(Duration::from_millis(1100));
    assert!(cache.get_error("nx.example", RecordType::A).is_none());
    assert_eq!(cache.error_len(), 0);
}

#[test]
fn message_tier_evicts_expired_entries_eagerly() {
    let cache = TieredCache::new(small_cache_config(100));

    // Min record TTL (1s) becomes the entry lifetime.
    cache.set_message(
        "signed.example",
        RecordType::A,
        a_response("signed.example", 1, &["1.2.3.4"]),
    );
    assert!(cache.get_message("signed.example", RecordType::A).is_some());

    std::thread::sleep(Duration::from_millis(1100));
    assert!(cache.get_message("signed.example", RecordType::A).is_none());
}

#[test]
fn hit_and_miss_metrics_accumulate() {
    let cache = TieredCache::new(small_cache_config(100));

    assert!(cache.get_raw("absent.example", RecordType::A).is_none());
    cache.set_raw("hit.example", RecordType::A, raw_write(&["1.1.1.1"], 300), 1);
    cache.get_raw("hit.example", RecordType::A);
    cache.get_raw("hit.example", RecordType::A);

    let metrics = cache.metrics();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hits, 2);
}

#[tokio::test]
async fn stale_hit_enqueues_exactly_one_refresh() {
    let cache = TieredCache::new(small_cache_config(100));
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    cache.set_stale_refresh_sender(tx);

    cache.set_raw("swr.example", RecordType::A, raw_write(&["1.2.3.4"], 1), 1);
    assert!(!cache.get_raw("swr.example", RecordType::A).unwrap().is_expired());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Stale, but still served; the refresh request goes out on the side.
    let entry = cache.get_raw("swr.example", RecordType::A).unwrap();
    assert!(entry.is_expired());
    assert_eq!(entry.ips, vec![ip("1.2.3.4")]);

    let request = rx.try_recv().expect("refresh request enqueued");
    assert_eq!(request.domain.as_str(), "swr.example");
    assert_eq!(request.record_type, RecordType::A);

    // The refreshing flag holds further requests until the consumer resets.
    cache.get_raw("swr.example", RecordType::A);
    assert!(rx.try_recv().is_err());

    cache.reset_refreshing("swr.example", RecordType::A);
    cache.get_raw("swr.example", RecordType::A);
    assert!(rx.try_recv().is_ok());

    assert_eq!(cache.metrics().stale_hits, 3);
}

#[test]
fn clear_empties_every_tier() {
    let cache = TieredCache::new(small_cache_config(100));
    cache.set_raw("a.example", RecordType::A, raw_write(&["1.1.1.1"], 300), 1);
    cache.set_sorted(
        "a.example",
        RecordType::A,
        SortedCacheEntry::single(ip("1.1.1.1"), 300),
    );
    cache.set_error("b.example", RecordType::A, ResponseCode::ServFail, 30);

    cache.clear();

    assert_eq!(cache.raw_len(), 0);
    assert_eq!(cache.sorted_len(), 0);
    assert_eq!(cache.error_len(), 0);
    assert!(cache.get_raw("a.example", RecordType::A).is_none());
}
