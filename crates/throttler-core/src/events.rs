//! Observability hooks independent of `tracing`/`metrics`.
//!
//! Components emit a typed event (rate changed, state transitioned, sample
//! dropped) to a list of listeners a caller registered on the configuration
//! builder. This is separate from the `tracing`/`metrics` integrations so a host
//! process can react programmatically (update a dashboard field, trip an alarm)
//! without scraping logs.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by throttler components.
pub trait ThrottlerEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g. `"rate_changed"`, `"state_transition"`).
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// The target this event originated from, formatted as `keyspace/shard`.
    fn target_name(&self) -> &str;
}

/// Trait for listening to throttler events.
pub trait EventListener<E: ThrottlerEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: ThrottlerEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: ThrottlerEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// A panicking listener is caught so the remaining listeners still run. With
    /// the `tracing` feature enabled the panic is logged as a warning; with
    /// `metrics` enabled a counter is incremented.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(_panic_payload) = result {
                #[cfg(feature = "tracing")]
                log_listener_panic(index, event, _panic_payload.as_ref());

                #[cfg(feature = "metrics")]
                record_listener_panic_metric(event);

                #[cfg(not(feature = "tracing"))]
                let _ = index;

                #[cfg(not(any(feature = "tracing", feature = "metrics")))]
                let _ = _panic_payload;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ThrottlerEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ThrottlerEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: ThrottlerEvent>(
    index: usize,
    event: &E,
    panic_payload: &(dyn Any + Send),
) {
    let panic_message = panic_payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic_payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        target = event.target_name(),
        event_type = event.event_type(),
        panic_message = %panic_message,
        "throttler event listener panicked"
    );
}

#[cfg(feature = "metrics")]
fn record_listener_panic_metric<E: ThrottlerEvent>(event: &E) {
    let target_label = event.target_name().to_string();
    let event_type_label = event.event_type().to_string();

    metrics::counter!(
        "throttler_event_listener_panics_total",
        "target" => target_label,
        "event_type" => event_type_label
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestEvent {
        target: String,
        timestamp: Instant,
    }

    impl ThrottlerEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "test"
        }

        fn timestamp(&self) -> Instant {
            self.timestamp
        }

        fn target_name(&self) -> &str {
            &self.target
        }
    }

    #[test]
    fn listeners_receive_every_emission() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_event: &TestEvent| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let event = TestEvent {
            target: "ks/0".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        listeners.emit(&event);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn a_panicking_listener_does_not_block_the_rest() {
        let successful = Arc::new(AtomicUsize::new(0));
        let successful_clone = Arc::clone(&successful);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &TestEvent| {
            successful_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let event = TestEvent {
            target: "ks/0".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);
        assert_eq!(successful.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn listener_panics_increment_metrics() {
        use metrics::set_global_recorder;
        use metrics_util::debugging::DebugValue;
        use metrics_util::debugging::DebuggingRecorder;
        use std::sync::LazyLock;

        static RECORDER: LazyLock<DebuggingRecorder> = LazyLock::new(DebuggingRecorder::default);
        let _ = set_global_recorder(&*RECORDER);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));

        let event = TestEvent {
            target: "panic-metric-target".to_string(),
            timestamp: Instant::now(),
        };
        listeners.emit(&event);

        let snapshot = RECORDER.snapshotter().snapshot().into_vec();
        let found = snapshot.iter().any(|(key, _, _, value)| {
            key.key().name() == "throttler_event_listener_panics_total"
                && matches!(value, DebugValue::Counter(_))
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == "target" && l.value() == "panic-metric-target")
        });
        assert!(found, "expected listener panic counter to be recorded");
    }
}
