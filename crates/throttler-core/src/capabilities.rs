//! Capability traits for the throttler's external collaborators.
//!
//! Every component that talks to the outside world does so through one of these
//! traits rather than a concrete client type. Production code is handed concrete
//! implementations; tests are handed deterministic fakes. None of these traits are
//! generic over a response/error pair the way the resilience layers are — each one
//! models exactly the one external system it stands in for.

use crate::error::CapabilityError;
use crate::types::TabletIdentity;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

/// A monotonic clock. Never wall-clock: callers rely on it only ever moving forward.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The production clock, backed by `Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Read-only lookup of which tablets exist in a (cell, keyspace, shard).
///
/// Boxed futures are used here (rather than an `async fn` in the trait) because this
/// trait is consumed as `Arc<dyn TopologyService>` so tests can substitute a fake
/// implementation without the production client ever being in scope.
pub trait TopologyService: Send + Sync {
    fn list_tablets(
        &self,
        cell: &str,
        keyspace: &str,
        shard: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TabletIdentity>, CapabilityError>> + Send + '_>>;
}

/// A subscription handle returned by [`HealthStream::subscribe`].
///
/// Dropping the subscription does not release server-side resources; callers must
/// call [`close`](HealthSubscription::close) explicitly, matching the invariant that
/// every acquired subscription is released before an open interval ends.
pub trait HealthSubscription: Send {
    /// Receives the next event, or `None` once the stream has ended.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<crate::types::TabletHealthSample>> + Send + '_>>;

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// The external health event stream, scoped by a subscription.
pub trait HealthStream: Send + Sync {
    fn subscribe(
        &self,
        cells: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn HealthSubscription>, CapabilityError>> + Send + '_>>;

    /// Tells the stream which tablets currently exist in `cell`, so it knows which
    /// tablets to emit health events for. Called by the fleet watchers on every
    /// topology refresh tick. A stream that derives membership itself (rather than
    /// being told) can leave this as a no-op.
    fn notify_membership(
        &self,
        _cell: &str,
        _tablets: &[TabletIdentity],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// A leveled logging sink. Production implementations forward to `tracing`; the
/// throttler never calls these from the admission path.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// The production logger, forwarding to `tracing`'s global dispatcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        #[cfg(feature = "tracing")]
        tracing::info!("{message}");
        #[cfg(not(feature = "tracing"))]
        let _ = message;
    }

    fn warn(&self, message: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!("{message}");
        #[cfg(not(feature = "tracing"))]
        let _ = message;
    }

    fn error(&self, message: &str) {
        #[cfg(feature = "tracing")]
        tracing::error!("{message}");
        #[cfg(not(feature = "tracing"))]
        let _ = message;
    }
}
