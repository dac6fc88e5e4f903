mod helpers;

use helpers::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use velo_dns_domain::{HealthCheckConfig, RecordType, UpstreamConfig, UpstreamStrategy};
use velo_dns_application::Upstream;
use velo_dns_infrastructure::dns::cache::{RawWrite, TieredCache};
use velo_dns_infrastructure::dns::sort::SortingCoordinator;
use velo_dns_infrastructure::dns::upstream::UpstreamManager;

/// The full lookup pipeline the server layer drives: miss → orchestrated
/// resolution → raw write → rank → sorted serve, with the parallel
/// strategy's background merge landing afterwards under the version rule.
#[tokio::test]
async fn miss_resolve_sort_serve_then_background_merge() {
    let quick = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(10),
        a_response("app.example", 300, &["1.1.1.1", "2.2.2.2"]),
    );
    let slow = MockUpstream::responding(
        "10.0.0.3:53",
        Duration::from_millis(120),
        a_response("app.example", 200, &["3.3.3.3"]),
    );

    let manager = UpstreamManager::new(
        vec![
            Arc::clone(&quick) as Arc<dyn Upstream>,
            Arc::clone(&slow) as Arc<dyn Upstream>,
        ],
        UpstreamConfig {
            strategy: UpstreamStrategy::Parallel,
            timeout_ms: 2000,
            collect_timeout_ms: 1000,
            ..UpstreamConfig::default()
        },
        HealthCheckConfig::default(),
    );

    let cache = Arc::new(TieredCache::new(small_cache_config(100)));
    cache.start();
    let coordinator = SortingCoordinator::new(
        Arc::clone(&cache),
        Arc::new(ReversingRanker),
        &sort_config(2, 16),
    );

    // Background merges flow straight back into the raw tier, carrying the
    // version the resolution was stamped with.
    let callback_cache = Arc::clone(&cache);
    let (merged_tx, mut merged_rx) = tokio::sync::mpsc::channel(1);
    manager.set_cache_update_callback(Arc::new(move |update| {
        let applied = callback_cache.set_raw(
            &update.domain,
            update.record_type,
            RawWrite {
                ips: update.ips.clone(),
                cnames: update.cnames.clone(),
                records: update.records.clone(),
                ttl: update.ttl,
                authenticated: false,
            },
            update.version,
        );
        let _ = merged_tx.try_send(applied);
    }));

    // Phase 1: cache miss, resolve upstream, store and kick off ranking.
    let q = question("app.example");
    assert!(cache.get_raw("app.example", RecordType::A).is_none());
    let reply = manager.query(&q).await.unwrap();
    assert_eq!(reply.ips, vec![ip("1.1.1.1"), ip("2.2.2.2")]);

    assert!(cache.set_raw(
        "app.example",
        RecordType::A,
        RawWrite {
            ips: reply.ips.clone(),
            cnames: reply.cnames.clone(),
            records: reply.records.clone(),
            ttl: reply.ttl,
            authenticated: reply.authenticated,
        },
        reply.version,
    ));

    coordinator
        .sort_and_wait("app.example", RecordType::A, reply.ips.clone(), reply.ttl)
        .await
        .unwrap();

    // Phase 2: the ranked view serves subsequent lookups.
    let sorted = cache.get_sorted("app.example", RecordType::A).unwrap();
    assert_eq!(sorted.ips, vec![ip("2.2.2.2"), ip("1.1.1.1")]);
    assert_eq!(sorted.ips.len(), sorted.rtts_ms.len());

    // The slow server's answer arrives later and widens the raw entry.
    // Same version, so the write is accepted, not dropped.
    let applied = tokio::time::timeout(Duration::from_secs(2), merged_rx.recv())
        .await
        .expect("merge arrived")
        .expect("callback ran");
    assert!(applied);

    let raw = cache.get_raw("app.example", RecordType::A).unwrap();
    let all: HashSet<_> = raw.ips.iter().copied().collect();
    assert_eq!(
        all,
        HashSet::from([ip("1.1.1.1"), ip("2.2.2.2"), ip("3.3.3.3")])
    );
    assert_eq!(raw.upstream_ttl, 200);

    // A fresh resolution bumps the version; a replay of the old merge must
    // now lose.
    let newer = manager.query(&question("app.example")).await.unwrap();
    assert!(newer.version > reply.version);
    assert!(cache.set_raw(
        "app.example",
        RecordType::A,
        RawWrite {
            ips: newer.ips.clone(),
            cnames: vec![],
            records: newer.records.clone(),
            ttl: newer.ttl,
            authenticated: false,
        },
        newer.version,
    ));
    assert!(!cache.set_raw(
        "app.example",
        RecordType::A,
        RawWrite {
            ips: vec![ip("9.9.9.9")],
            cnames: vec![],
            records: vec![],
            ttl: 60,
            authenticated: false,
        },
        reply.version,
    ));
}
