//! End-to-end scenarios exercising the whole throttler: configuration through
//! admission decisions, driven entirely through deterministic fakes.

use std::sync::Arc;
use std::time::Duration;

use throttler::{ControllerParams, SystemClock, Target, Throttler, ThrottlerConfig, TracingLogger};
use throttler_core::{TabletHealthSample, TabletIdentity, TabletRole};
use throttler_testkit::{FakeHealthStream, FakeTopology};

fn replica_sample(lag: f64) -> TabletHealthSample {
    TabletHealthSample {
        tablet: TabletIdentity::new("zone1", 1),
        role: TabletRole::Replica,
        keyspace: "commerce".into(),
        shard: "0".into(),
        replication_lag_seconds: lag,
        received_at: std::time::Instant::now(),
    }
}

fn primary_sample(lag: f64) -> TabletHealthSample {
    TabletHealthSample {
        tablet: TabletIdentity::new("zone1", 0),
        role: TabletRole::Primary,
        keyspace: "commerce".into(),
        shard: "0".into(),
        replication_lag_seconds: lag,
        received_at: std::time::Instant::now(),
    }
}

fn fast_controller_params() -> ControllerParams {
    ControllerParams::builder()
        .evaluation_interval(Duration::from_millis(20))
        .staleness_window(Duration::from_secs(5))
        .rate_floor(1.0)
        .rate_ceiling(1000.0)
        .initial_rate(50.0)
        .increase_by(20.0)
        .decrease_factor(0.5)
        .high_water_multiplier(2.0)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_pass_through() {
    let topology = FakeTopology::new();
    let health_stream = FakeHealthStream::new();
    let throttler = Arc::new(Throttler::new(
        ThrottlerConfig::builder().enabled(false),
        topology,
        health_stream,
        Arc::new(SystemClock),
        Arc::new(TracingLogger),
    ));
    throttler.init_target(Target::new("commerce", "0", "zone1"));
    throttler.open().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let throttler = Arc::clone(&throttler);
        handles.push(tokio::spawn(async move {
            (0..100).filter(|_| throttler.throttle()).count()
        }));
    }

    let mut denied = 0;
    for handle in handles {
        denied += handle.await.unwrap();
    }
    assert_eq!(denied, 0);

    let snapshot = throttler.snapshot();
    assert!(!snapshot.is_open);
    assert!(!snapshot.enabled);
}

#[tokio::test]
async fn steady_healthy_replicas_keep_rate_high() {
    let topology = FakeTopology::new();
    topology.set_tablets("zone1", vec![TabletIdentity::new("zone1", 1)]);
    let health_stream = FakeHealthStream::new();

    let throttler = Arc::new(Throttler::new(
        ThrottlerConfig::builder()
            .observation_cells(["zone1"])
            .max_replication_lag_seconds(10.0)
            .controller_params(fast_controller_params()),
        topology,
        health_stream.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingLogger),
    ));
    throttler.init_target(Target::new("commerce", "0", "zone1"));
    throttler.open().await.unwrap();

    for _ in 0..6 {
        health_stream.push(replica_sample(0.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let snapshot = throttler.snapshot();
    assert!(snapshot.current_max_rate > 50.0, "rate should have increased from its initial value");
    assert_eq!(snapshot.aggregate_lag_seconds, Some(0.0));

    throttler.close().await;
}

#[tokio::test]
async fn lag_spike_triggers_and_then_recovers() {
    let topology = FakeTopology::new();
    topology.set_tablets("zone1", vec![TabletIdentity::new("zone1", 1)]);
    let health_stream = FakeHealthStream::new();

    let throttler = Arc::new(Throttler::new(
        ThrottlerConfig::builder()
            .observation_cells(["zone1"])
            .max_replication_lag_seconds(10.0)
            .controller_params(fast_controller_params()),
        topology,
        health_stream.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingLogger),
    ));
    throttler.init_target(Target::new("commerce", "0", "zone1"));
    throttler.open().await.unwrap();

    for _ in 0..4 {
        health_stream.push(replica_sample(0.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let rate_before_spike = throttler.snapshot().current_max_rate;

    for _ in 0..4 {
        health_stream.push(replica_sample(60.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let rate_during_spike = throttler.snapshot().current_max_rate;
    assert!(
        rate_during_spike < rate_before_spike,
        "lag spike should drive the rate down from {rate_before_spike} to below itself, got {rate_during_spike}"
    );

    for _ in 0..10 {
        health_stream.push(replica_sample(0.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let rate_after_recovery = throttler.snapshot().current_max_rate;
    assert!(
        rate_after_recovery > rate_during_spike,
        "rate should climb back up once lag subsides"
    );

    throttler.close().await;
}

#[tokio::test]
async fn non_replica_samples_are_invisible_to_the_controller() {
    let topology = FakeTopology::new();
    topology.set_tablets("zone1", vec![TabletIdentity::new("zone1", 0)]);
    let health_stream = FakeHealthStream::new();

    let throttler = Arc::new(Throttler::new(
        ThrottlerConfig::builder()
            .observation_cells(["zone1"])
            .max_replication_lag_seconds(10.0)
            .controller_params(fast_controller_params()),
        topology,
        health_stream.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingLogger),
    ));
    throttler.init_target(Target::new("commerce", "0", "zone1"));
    throttler.open().await.unwrap();

    for _ in 0..5 {
        health_stream.push(primary_sample(999.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let snapshot = throttler.snapshot();
    assert_eq!(snapshot.aggregate_lag_seconds, None, "no replica sample ever arrived");
    assert_eq!(snapshot.current_max_rate, 50.0, "rate should sit at its initial value");

    throttler.close().await;
}

#[tokio::test]
async fn open_close_cycle_leaves_no_residue() {
    let topology = FakeTopology::new();
    topology.set_tablets("zone1", vec![TabletIdentity::new("zone1", 1)]);
    let health_stream = FakeHealthStream::new();

    let throttler = Arc::new(Throttler::new(
        ThrottlerConfig::builder()
            .observation_cells(["zone1"])
            .max_replication_lag_seconds(10.0)
            .controller_params(fast_controller_params()),
        topology,
        health_stream.clone(),
        Arc::new(SystemClock),
        Arc::new(TracingLogger),
    ));
    throttler.init_target(Target::new("commerce", "0", "zone1"));

    const CYCLES: usize = 20;
    for _ in 0..CYCLES {
        throttler.open().await.unwrap();
        for _ in 0..100 {
            let _ = throttler.throttle();
        }
        throttler.close().await;
        assert!(!throttler.snapshot().is_open);
    }

    assert_eq!(
        health_stream.closed_subscription_count(),
        CYCLES,
        "every subscription acquired on open() must be closed by close()"
    );
}

#[tokio::test]
async fn invalid_config_falls_back_to_disabled() {
    let topology = FakeTopology::new();
    let health_stream = FakeHealthStream::new();

    let throttler = Arc::new(Throttler::new(
        ThrottlerConfig::builder().enabled(true).observation_cells(Vec::<String>::new()),
        topology,
        health_stream,
        Arc::new(SystemClock),
        Arc::new(TracingLogger),
    ));
    throttler.init_target(Target::new("commerce", "0", "zone1"));

    assert!(throttler.open().await.is_ok());
    for _ in 0..100 {
        assert!(!throttler.throttle());
    }
    assert!(!throttler.snapshot().is_open);
}
