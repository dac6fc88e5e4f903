use std::time::Duration;
use velo_dns_domain::UpstreamConfig;
use velo_dns_infrastructure::dns::upstream::DynamicTuning;

#[test]
fn defaults_apply_before_any_samples() {
    let tuning = DynamicTuning::new(&UpstreamConfig::default());

    assert_eq!(tuning.average_latency(), Duration::from_millis(200));
    assert_eq!(tuning.latency_std_dev(), Duration::ZERO);
    // clamp(200ms - 0, 20..=200) and clamp(1.5 * 200ms, 500..=2000).
    assert_eq!(tuning.racing_delay(), Duration::from_millis(200));
    assert_eq!(tuning.sequential_timeout(), Duration::from_millis(500));
}

#[test]
fn sequential_timeout_tracks_observed_latency() {
    let tuning = DynamicTuning::new(&UpstreamConfig::default());
    for _ in 0..50 {
        tuning.record_query_latency(Duration::from_millis(800));
    }

    let avg = tuning.average_latency();
    assert!(avg > Duration::from_millis(700));
    // 1.5 * ~800ms, inside the 500ms..2s clamp.
    let timeout = tuning.sequential_timeout();
    assert!(timeout > Duration::from_millis(1000) && timeout <= Duration::from_secs(2));
}

#[test]
fn sequential_timeout_clamps_at_the_ceiling() {
    let tuning = DynamicTuning::new(&UpstreamConfig::default());
    for _ in 0..50 {
        tuning.record_query_latency(Duration::from_secs(5));
    }
    assert_eq!(tuning.sequential_timeout(), Duration::from_secs(2));
}

#[test]
fn jitter_shrinks_the_racing_delay() {
    let tuning = DynamicTuning::new(&UpstreamConfig::default());
    // Stable 100ms network first.
    for _ in 0..40 {
        tuning.record_query_latency(Duration::from_millis(100));
    }
    let stable_delay = tuning.racing_delay();

    // Now heavy jitter around the same mean.
    for _ in 0..40 {
        tuning.record_query_latency(Duration::from_millis(10));
        tuning.record_query_latency(Duration::from_millis(190));
    }
    let jittery_delay = tuning.racing_delay();

    assert!(tuning.latency_std_dev() > Duration::from_millis(20));
    assert!(jittery_delay < stable_delay);
    assert!(jittery_delay >= Duration::from_millis(20));
    assert!(jittery_delay <= Duration::from_millis(200));
}

#[test]
fn racing_delay_never_leaves_its_bounds() {
    let tuning = DynamicTuning::new(&UpstreamConfig::default());
    for _ in 0..30 {
        tuning.record_query_latency(Duration::from_millis(1));
    }
    assert_eq!(tuning.racing_delay(), Duration::from_millis(20));

    for _ in 0..200 {
        tuning.record_query_latency(Duration::from_secs(3));
    }
    assert_eq!(tuning.racing_delay(), Duration::from_millis(200));
}

#[test]
fn batch_params_widen_under_jitter_and_large_pools() {
    let tuning = DynamicTuning::new(&UpstreamConfig::default());
    let (calm_batch, calm_stagger) = tuning.racing_batch_params(3);
    assert_eq!(calm_batch, 2);
    assert_eq!(calm_stagger, Duration::from_millis(20));

    for _ in 0..40 {
        tuning.record_query_latency(Duration::from_millis(5));
        tuning.record_query_latency(Duration::from_millis(400));
    }
    let (jitter_batch, jitter_stagger) = tuning.racing_batch_params(8);
    assert_eq!(jitter_batch, 4);
    assert_eq!(jitter_stagger, Duration::from_millis(15));
}
