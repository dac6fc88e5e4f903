mod helpers;

use helpers::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use velo_dns_domain::{
    DomainError, HealthCheckConfig, ResponseCode, UpstreamConfig, UpstreamStrategy,
};
use velo_dns_application::Upstream;
use velo_dns_infrastructure::dns::upstream::{CacheUpdate, UpstreamManager};

fn manager_with(
    strategy: UpstreamStrategy,
    servers: Vec<Arc<dyn Upstream>>,
) -> Arc<UpstreamManager> {
    let config = UpstreamConfig {
        strategy,
        timeout_ms: 2000,
        collect_timeout_ms: 1000,
        ..UpstreamConfig::default()
    };
    UpstreamManager::new(servers, config, HealthCheckConfig::default())
}

#[tokio::test]
async fn parallel_returns_the_fastest_answer_and_merges_the_rest() {
    let failing = MockUpstream::failing(
        "10.0.0.1:53",
        Duration::from_millis(1),
        DomainError::Transport("connection refused".into()),
    );
    let quick = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(10),
        a_response("multi.example", 300, &["1.1.1.1", "2.2.2.2"]),
    );
    let slow = MockUpstream::responding(
        "10.0.0.3:53",
        Duration::from_millis(200),
        a_response("multi.example", 120, &["2.2.2.2", "3.3.3.3", "4.4.4.4"]),
    );

    let manager = manager_with(
        UpstreamStrategy::Parallel,
        vec![
            Arc::clone(&failing) as Arc<dyn Upstream>,
            Arc::clone(&quick) as Arc<dyn Upstream>,
            Arc::clone(&slow) as Arc<dyn Upstream>,
        ],
    );

    let (update_tx, mut update_rx) = tokio::sync::mpsc::channel::<CacheUpdate>(1);
    manager.set_cache_update_callback(Arc::new(move |update| {
        let _ = update_tx.try_send(update);
    }));

    let started = Instant::now();
    let reply = manager.query(&question("multi.example")).await.unwrap();
    let elapsed = started.elapsed();

    // Caller latency tracks the fastest healthy server, not the slowest.
    assert_eq!(reply.ips, vec![ip("1.1.1.1"), ip("2.2.2.2")]);
    assert_eq!(reply.ttl, 300);
    assert!(elapsed < Duration::from_millis(150), "took {:?}", elapsed);

    // The slow server's answer still reaches the cache: union of four
    // unique addresses under the minimum TTL.
    let update = tokio::time::timeout(Duration::from_secs(2), update_rx.recv())
        .await
        .expect("collection finished")
        .expect("cache update delivered");
    assert_eq!(update.domain.as_ref(), "multi.example");
    let merged: HashSet<_> = update.ips.iter().copied().collect();
    assert_eq!(
        merged,
        HashSet::from([ip("1.1.1.1"), ip("2.2.2.2"), ip("3.3.3.3"), ip("4.4.4.4")])
    );
    assert_eq!(update.records.len(), 4);
    assert_eq!(update.ttl, 120);
    assert_eq!(update.version, reply.version);

    assert_eq!(quick.calls(), 1);
    assert_eq!(slow.calls(), 1);
    assert_eq!(failing.calls(), 1);
}

#[tokio::test]
async fn parallel_surfaces_nxdomain_as_a_definitive_answer() {
    let a = MockUpstream::responding(
        "10.0.0.1:53",
        Duration::from_millis(5),
        nxdomain_response("example", 60),
    );
    let b = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(50),
        nxdomain_response("example", 60),
    );
    let manager = manager_with(
        UpstreamStrategy::Parallel,
        vec![
            Arc::clone(&a) as Arc<dyn Upstream>,
            Arc::clone(&b) as Arc<dyn Upstream>,
        ],
    );

    let reply = manager.query(&question("gone.example")).await.unwrap();
    assert_eq!(reply.rcode, ResponseCode::NxDomain);
    assert_eq!(reply.ttl, 60);
    assert!(reply.ips.is_empty());
}

#[tokio::test]
async fn sequential_skips_breaker_open_servers_without_spending_their_timeout() {
    let flaky = MockUpstream::failing(
        "10.0.0.1:53",
        Duration::from_millis(20),
        DomainError::Transport("connection reset".into()),
    );
    let steady = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(10),
        a_response("steady.example", 300, &["5.5.5.5"]),
    );
    let manager = manager_with(
        UpstreamStrategy::Sequential,
        vec![
            Arc::clone(&flaky) as Arc<dyn Upstream>,
            Arc::clone(&steady) as Arc<dyn Upstream>,
        ],
    );

    // Five queries trip flaky's breaker (threshold 5); each still succeeds
    // through steady.
    for i in 0..5 {
        let q = question(&format!("warm{}.example", i));
        let reply = manager.query(&q).await.unwrap();
        assert_eq!(reply.ips, vec![ip("5.5.5.5")]);
    }
    assert_eq!(flaky.calls(), 5);

    // Breaker open: the next query goes straight to steady.
    let started = Instant::now();
    let reply = manager.query(&question("after.example")).await.unwrap();
    assert_eq!(reply.ips, vec![ip("5.5.5.5")]);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(flaky.calls(), 5);
    assert_eq!(steady.calls(), 6);
}

#[tokio::test]
async fn sequential_returns_nxdomain_immediately() {
    let authority = MockUpstream::responding(
        "10.0.0.1:53",
        Duration::from_millis(5),
        nxdomain_response("example", 45),
    );
    let never_needed = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(5),
        a_response("ghost.example", 300, &["9.9.9.9"]),
    );
    let manager = manager_with(
        UpstreamStrategy::Sequential,
        vec![
            Arc::clone(&authority) as Arc<dyn Upstream>,
            Arc::clone(&never_needed) as Arc<dyn Upstream>,
        ],
    );

    let reply = manager.query(&question("ghost.example")).await.unwrap();
    assert_eq!(reply.rcode, ResponseCode::NxDomain);
    assert_eq!(reply.ttl, 45);
    // Definitive negatives stop the strategy; the second server never ran.
    assert_eq!(never_needed.calls(), 0);
}

#[tokio::test]
async fn sequential_treats_empty_answers_as_failures() {
    let empty = MockUpstream::responding(
        "10.0.0.1:53",
        Duration::from_millis(5),
        a_response("empty.example", 300, &[]),
    );
    let full = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(5),
        a_response("empty.example", 300, &["7.7.7.7"]),
    );
    let manager = manager_with(
        UpstreamStrategy::Sequential,
        vec![
            Arc::clone(&empty) as Arc<dyn Upstream>,
            Arc::clone(&full) as Arc<dyn Upstream>,
        ],
    );

    let reply = manager.query(&question("empty.example")).await.unwrap();
    assert_eq!(reply.ips, vec![ip("7.7.7.7")]);
    assert_eq!(empty.calls(), 1);
}

#[tokio::test]
async fn racing_early_trigger_skips_the_stagger_delay() {
    // With no latency history the adaptive delay sits at its 200ms ceiling.
    // A transport-level primary failure must start the wave immediately,
    // not 200ms later.
    let primary = MockUpstream::failing(
        "10.0.0.1:53",
        Duration::from_millis(5),
        DomainError::Transport("host unreachable".into()),
    );
    let backup = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(20),
        a_response("race.example", 300, &["6.6.6.6"]),
    );
    let manager = manager_with(
        UpstreamStrategy::Racing,
        vec![
            Arc::clone(&primary) as Arc<dyn Upstream>,
            Arc::clone(&backup) as Arc<dyn Upstream>,
        ],
    );

    let started = Instant::now();
    let reply = manager.query(&question("race.example")).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(reply.ips, vec![ip("6.6.6.6")]);
    assert!(elapsed < Duration::from_millis(150), "took {:?}", elapsed);
    assert_eq!(primary.calls(), 1);
    assert_eq!(backup.calls(), 1);
}

#[tokio::test]
async fn racing_primary_wins_without_a_wave() {
    let primary = MockUpstream::responding(
        "10.0.0.1:53",
        Duration::from_millis(10),
        a_response("calm.example", 300, &["8.8.8.8"]),
    );
    let backup = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(10),
        a_response("calm.example", 300, &["9.9.9.9"]),
    );
    let manager = manager_with(
        UpstreamStrategy::Racing,
        vec![
            Arc::clone(&primary) as Arc<dyn Upstream>,
            Arc::clone(&backup) as Arc<dyn Upstream>,
        ],
    );

    let reply = manager.query(&question("calm.example")).await.unwrap();
    assert_eq!(reply.ips, vec![ip("8.8.8.8")]);
    // The primary answered inside the delay window; no second wave.
    assert_eq!(backup.calls(), 0);
}

#[tokio::test]
async fn random_tries_every_server_and_skips_open_breakers() {
    let dead = MockUpstream::failing(
        "10.0.0.1:53",
        Duration::from_millis(5),
        DomainError::Transport("connection refused".into()),
    );
    let alive = MockUpstream::responding(
        "10.0.0.2:53",
        Duration::from_millis(5),
        a_response("lucky.example", 300, &["4.4.4.4"]),
    );
    let manager = manager_with(
        UpstreamStrategy::Random,
        vec![
            Arc::clone(&dead) as Arc<dyn Upstream>,
            Arc::clone(&alive) as Arc<dyn Upstream>,
        ],
    );

    for i in 0..10 {
        let reply = manager
            .query(&question(&format!("lucky{}.example", i)))
            .await
            .unwrap();
        assert_eq!(reply.ips, vec![ip("4.4.4.4")]);
    }
    // The failing server trips its breaker along the way and stops being
    // tried; it can never exceed the healthy server's call count.
    assert!(dead.calls() <= 5);
    assert_eq!(alive.calls(), 10);
}

#[tokio::test]
async fn exhausted_pools_prefer_dns_semantic_errors() {
    let refused = MockUpstream::responding(
        "10.0.0.1:53",
        Duration::from_millis(5),
        velo_dns_domain::UpstreamResponse::empty(ResponseCode::Refused),
    );
    let unreachable = MockUpstream::failing(
        "10.0.0.2:53",
        Duration::from_millis(5),
        DomainError::Transport("network unreachable".into()),
    );
    let manager = manager_with(
        UpstreamStrategy::Sequential,
        vec![
            Arc::clone(&refused) as Arc<dyn Upstream>,
            Arc::clone(&unreachable) as Arc<dyn Upstream>,
        ],
    );

    let err = manager.query(&question("doomed.example")).await.unwrap_err();
    assert_eq!(err, DomainError::UpstreamRcode(ResponseCode::Refused));
}
