//! Deterministic fakes for the throttler's external collaborators.
//!
//! These are not mocks in the "assert call counts" sense; they are small, faithful
//! stand-ins that a test can drive explicitly (advance the clock, push a health
//! sample, change what topology reports) so scenario tests are reproducible instead
//! of timing-dependent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use throttler_core::capabilities::HealthSubscription;
use throttler_core::{CapabilityError, Clock, HealthStream, TabletHealthSample, TabletIdentity, TopologyService};

/// A clock a test can advance by hand. Starts at `Instant::now()` and only ever
/// moves forward, matching the monotonic-clock contract every consumer relies on.
pub struct FakeClock {
    now: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Instant::now()),
        })
    }

    pub fn advance(&self, by: std::time::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// A topology service whose per-cell tablet lists a test sets directly.
pub struct FakeTopology {
    tablets: Mutex<HashMap<String, Vec<TabletIdentity>>>,
    fail_next: Mutex<bool>,
}

impl FakeTopology {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tablets: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(false),
        })
    }

    pub fn set_tablets(&self, cell: impl Into<String>, tablets: Vec<TabletIdentity>) {
        self.tablets.lock().unwrap().insert(cell.into(), tablets);
    }

    /// Makes the next `list_tablets` call fail, simulating a transient outage.
    pub fn fail_next_call(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

impl TopologyService for FakeTopology {
    fn list_tablets(
        &self,
        cell: &str,
        _keyspace: &str,
        _shard: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TabletIdentity>, CapabilityError>> + Send + '_>> {
        let cell = cell.to_string();
        Box::pin(async move {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(CapabilityError::TopologyUnavailable {
                    cell,
                    reason: "simulated outage".to_string(),
                });
            }
            Ok(self.tablets.lock().unwrap().get(&cell).cloned().unwrap_or_default())
        })
    }
}

/// A health stream backed by an in-memory queue a test pushes samples onto.
pub struct FakeHealthStream {
    queue: Arc<Mutex<std::collections::VecDeque<TabletHealthSample>>>,
    subscriptions_closed: Arc<std::sync::atomic::AtomicUsize>,
}

impl FakeHealthStream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Arc::new(Mutex::new(std::collections::VecDeque::new())),
            subscriptions_closed: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })
    }

    pub fn push(&self, sample: TabletHealthSample) {
        self.queue.lock().unwrap().push_back(sample);
    }

    pub fn closed_subscription_count(&self) -> usize {
        self.subscriptions_closed
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

struct FakeHealthSubscription {
    queue: Arc<Mutex<std::collections::VecDeque<TabletHealthSample>>>,
    closed: Arc<std::sync::atomic::AtomicUsize>,
}

impl HealthSubscription for FakeHealthSubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<TabletHealthSample>> + Send + '_>> {
        let queue = Arc::clone(&self.queue);
        Box::pin(async move {
            loop {
                if let Some(sample) = queue.lock().unwrap().pop_front() {
                    return Some(sample);
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.closed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Box::pin(async {})
    }
}

impl HealthStream for FakeHealthStream {
    fn subscribe(
        &self,
        _cells: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn HealthSubscription>, CapabilityError>> + Send + '_>> {
        let queue = Arc::clone(&self.queue);
        let closed = Arc::clone(&self.subscriptions_closed);
        Box::pin(async move {
            let sub: Box<dyn HealthSubscription> = Box::new(FakeHealthSubscription { queue, closed });
            Ok(sub)
        })
    }
}
