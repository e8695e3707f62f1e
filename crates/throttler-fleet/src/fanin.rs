//! Bridges the external health stream to the lag controller.

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use throttler_core::{Clock, HealthStream, Logger, TabletHealthSample, TabletRole, Target};
use throttler_controller::Controller;

/// Subscribes to the health stream scoped to a set of cells, filters events down
/// to replicas for one target, and forwards the rest to a [`Controller`].
pub struct HealthFanIn {
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
    cancel: Arc<Notify>,
}

impl HealthFanIn {
    /// Acquires a subscription and spawns the single consumer task for this open
    /// interval. Returns an error if the subscription itself could not be acquired;
    /// per-event handling never fails past this point.
    ///
    /// The task reads from the subscription and from a cancellation signal; on
    /// either the stream ending or `stop()` being called, it closes the
    /// subscription itself before exiting, so the subscription is never merely
    /// dropped.
    pub async fn start(
        observation_cells: &[String],
        target: Target,
        health_stream: Arc<dyn HealthStream>,
        controller: Arc<Controller>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, throttler_core::CapabilityError> {
        let mut subscription = health_stream.subscribe(observation_cells).await?;
        let cancel = Arc::new(Notify::new());
        let task_cancel = Arc::clone(&cancel);

        let task = tokio::spawn(async move {
            loop {
                let sample = tokio::select! {
                    _ = task_cancel.notified() => break,
                    sample = subscription.recv() => sample,
                };
                let Some(sample) = sample else {
                    break;
                };
                if sample.role != TabletRole::Replica {
                    continue;
                }
                if !sample.matches_target(&target) {
                    continue;
                }
                let sample = stamp_received_at(sample, clock.as_ref());
                if !sample.is_usable() {
                    logger.warn(&format!(
                        "dropping non-finite or negative lag sample from tablet {:?}",
                        sample.tablet
                    ));
                    continue;
                }
                controller.record_lag(sample);
            }
            subscription.close().await;
        });

        Ok(Self {
            task: std::sync::Mutex::new(Some(task)),
            cancel,
        })
    }

    /// Signals cancellation and waits for the consumer task to close its
    /// subscription and exit.
    pub async fn stop(&self) {
        self.cancel.notify_one();
        let task = self.task.lock().expect("health fan-in mutex poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for HealthFanIn {
    fn drop(&mut self) {
        self.cancel.notify_one();
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

/// Annotates a raw sample read from the wire with the receive-time stamp the
/// fan-in is responsible for assigning, per the contract that lag samples are
/// timestamped at receipt rather than trusted from the reporting tablet's clock.
pub fn stamp_received_at(mut sample: TabletHealthSample, clock: &dyn throttler_core::Clock) -> TabletHealthSample {
    sample.received_at = clock.now();
    sample
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use throttler_core::{CapabilityError, SystemClock, TabletIdentity, TracingLogger};
    use throttler_controller::ControllerParams;
    use throttler_limiter::RateLimiter;

    struct FakeSubscription {
        events: std::sync::Mutex<Vec<TabletHealthSample>>,
        closed: Arc<AtomicUsize>,
    }

    impl throttler_core::capabilities::HealthSubscription for FakeSubscription {
        fn recv(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Option<TabletHealthSample>> + Send + '_>> {
            let next = self.events.lock().unwrap().pop();
            Box::pin(async move { next })
        }

        fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    struct FakeHealthStream {
        events: Vec<TabletHealthSample>,
        closed: Arc<AtomicUsize>,
    }

    impl HealthStream for FakeHealthStream {
        fn subscribe(
            &self,
            _cells: &[String],
        ) -> Pin<
            Box<
                dyn Future<Output = Result<Box<dyn throttler_core::capabilities::HealthSubscription>, CapabilityError>>
                    + Send
                    + '_,
            >,
        > {
            let events = self.events.clone();
            let closed = Arc::clone(&self.closed);
            Box::pin(async move {
                let sub: Box<dyn throttler_core::capabilities::HealthSubscription> =
                    Box::new(FakeSubscription {
                        events: std::sync::Mutex::new(events),
                        closed,
                    });
                Ok(sub)
            })
        }
    }

    fn sample(role: TabletRole, lag: f64) -> TabletHealthSample {
        TabletHealthSample {
            tablet: TabletIdentity::new("zone1", 1),
            role,
            keyspace: "ks".into(),
            shard: "0".into(),
            replication_lag_seconds: lag,
            received_at: std::time::Instant::now(),
        }
    }

    fn make_controller() -> Arc<Controller> {
        let clock = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::new(10.0, clock.clone()));
        let params = ControllerParams::builder().build().unwrap();
        Arc::new(Controller::new(
            "ks/0",
            10.0,
            params,
            limiter,
            clock,
            Arc::new(TracingLogger),
        ))
    }

    #[tokio::test]
    async fn non_replica_events_are_dropped() {
        let closed = Arc::new(AtomicUsize::new(0));
        let stream = Arc::new(FakeHealthStream {
            events: vec![sample(TabletRole::Primary, 99.0), sample(TabletRole::Rdonly, 99.0)],
            closed: closed.clone(),
        });
        let controller = make_controller();
        let target = Target::new("ks", "0", "zone1");

        let fanin = HealthFanIn::start(
            &["zone1".to_string()],
            target,
            stream,
            controller.clone(),
            Arc::new(SystemClock),
            Arc::new(TracingLogger),
        )
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        fanin.stop().await;

        // the stream ran dry (both events filtered out, then no more to recv), so
        // the consumer task closed its own subscription before `stop()` ran.
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        let _ = controller;
    }

    #[tokio::test]
    async fn replica_events_matching_target_reach_the_controller() {
        let closed = Arc::new(AtomicUsize::new(0));
        let stream = Arc::new(FakeHealthStream {
            events: vec![sample(TabletRole::Replica, 5.0)],
            closed,
        });
        let controller = make_controller();
        let target = Target::new("ks", "0", "zone1");

        let fanin = HealthFanIn::start(
            &["zone1".to_string()],
            target,
            stream,
            controller.clone(),
            Arc::new(SystemClock),
            Arc::new(TracingLogger),
        )
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        fanin.stop().await;
    }
}
