//! The public object a tablet server holds: configuration, target identity,
//! lifecycle state, and the single admission entry point.

use crate::config::{ThrottlerConfig, ThrottlerConfigBuilder};
use crate::events::ThrottlerFacadeEvent;
use crate::snapshot::ThrottlerSnapshot;
use crate::state::{AtomicThrottlerState, ThrottlerState};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use throttler_core::{Clock, HealthStream, Logger, Target, ThrottlerError, TopologyService};
use throttler_controller::Controller;
use throttler_fleet::{HealthFanIn, FleetWatcherSet};
use throttler_limiter::{CallerId, RateLimiter};

/// Fixed caller identity used on the admission path: every transaction funnels
/// through one logical producer, so the rate limiter core never needs to
/// distinguish callers.
const CALLER_ID: CallerId = 0;

/// Lag-driven admission gate for write transactions against one (keyspace, shard).
///
/// Created once per tablet server and repeatedly opened and closed across its
/// lifetime. See [`ThrottlerState`] for the lifecycle this type enforces.
pub struct Throttler {
    config: RwLock<ThrottlerConfig>,
    target: Mutex<Target>,
    target_label: RwLock<Arc<str>>,
    state: AtomicThrottlerState,
    topology: Arc<dyn TopologyService>,
    health_stream: Arc<dyn HealthStream>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    limiter: Mutex<Option<Arc<RateLimiter>>>,
    controller: Mutex<Option<Arc<Controller>>>,
    fanin: Mutex<Option<HealthFanIn>>,
    watchers: Mutex<Option<FleetWatcherSet>>,
}

impl Throttler {
    /// Construction always succeeds. If `config` is `enabled` but fails
    /// validation (empty `observation_cells`, non-positive lag target), the
    /// throttler silently falls back to a disabled instance and logs a warning —
    /// the host tablet server must not crash on bad throttler configuration.
    pub fn new(
        config: ThrottlerConfigBuilder,
        topology: Arc<dyn TopologyService>,
        health_stream: Arc<dyn HealthStream>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let config = match config.build() {
            Ok(config) => config,
            Err(e) => {
                logger.warn(&format!(
                    "invalid throttler configuration, falling back to disabled: {e}"
                ));
                ThrottlerConfig::disabled()
            }
        };

        Self {
            config: RwLock::new(config),
            target: Mutex::new(Target::new("", "", "")),
            target_label: RwLock::new(Arc::from("/")),
            state: AtomicThrottlerState::new(ThrottlerState::Closed),
            topology,
            health_stream,
            clock,
            logger,
            limiter: Mutex::new(None),
            controller: Mutex::new(None),
            fanin: Mutex::new(None),
            watchers: Mutex::new(None),
        }
    }

    /// Overwrites the immutable-per-interval target. Only allowed while `CLOSED`.
    pub fn init_target(&self, target: Target) {
        assert_eq!(
            self.state.load(),
            ThrottlerState::Closed,
            "init_target() called while the throttler is OPEN"
        );
        let label: Arc<str> = Arc::from(format!("{}/{}", target.keyspace, target.shard));
        *self.target_label.write().expect("target label lock poisoned") = label;
        *self.target.lock().expect("target lock poisoned") = target;
    }

    /// Replaces the configuration. Only allowed while `CLOSED`; unlike [`Self::new`]
    /// this surfaces validation failures so a caller fixing a bad reconfiguration
    /// gets a precise reason instead of a silent fallback.
    pub fn reconfigure(&self, config: ThrottlerConfigBuilder) -> Result<(), ThrottlerError> {
        assert_eq!(
            self.state.load(),
            ThrottlerState::Closed,
            "reconfigure() called while the throttler is OPEN"
        );
        let config = config.build()?;
        *self.config.write().expect("config lock poisoned") = config;
        Ok(())
    }

    /// `CLOSED -> OPEN`. No-op if already open or if the configuration is
    /// disabled. Constructs the rate limiter, controller, fan-in and watchers in
    /// that order; rolls back whatever was already constructed if any step fails.
    pub async fn open(&self) -> Result<(), ThrottlerError> {
        if self.state.load() == ThrottlerState::Open {
            return Ok(());
        }

        let config = self.config.read().expect("config lock poisoned").clone();
        if !config.enabled {
            return Ok(());
        }

        let target = self.target.lock().expect("target lock poisoned").clone();
        let target_name = format!("{}/{}", target.keyspace, target.shard);

        let limiter = Arc::new(RateLimiter::new(
            config.controller_params.initial_rate(),
            Arc::clone(&self.clock),
        ));

        let controller = Arc::new(Controller::new(
            target_name.clone(),
            config.max_replication_lag_seconds,
            config.controller_params.clone(),
            Arc::clone(&limiter),
            Arc::clone(&self.clock),
            Arc::clone(&self.logger),
        ));
        controller.start().await;

        let fanin = match HealthFanIn::start(
            &config.observation_cells,
            target.clone(),
            Arc::clone(&self.health_stream),
            Arc::clone(&controller),
            Arc::clone(&self.clock),
            Arc::clone(&self.logger),
        )
        .await
        {
            Ok(fanin) => fanin,
            Err(e) => {
                controller.close().await;
                limiter.close();
                return Err(ThrottlerError::from(e));
            }
        };

        let watchers = FleetWatcherSet::start(
            &config.observation_cells,
            target.keyspace.clone(),
            target.shard.clone(),
            Arc::clone(&self.topology),
            Arc::clone(&self.health_stream),
            Arc::clone(&self.logger),
            None,
        );

        *self.limiter.lock().expect("limiter lock poisoned") = Some(limiter);
        *self.controller.lock().expect("controller lock poisoned") = Some(controller);
        *self.fanin.lock().expect("fan-in lock poisoned") = Some(fanin);
        *self.watchers.lock().expect("watchers lock poisoned") = Some(watchers);

        self.transition(ThrottlerState::Closed, ThrottlerState::Open, &target_name);
        Ok(())
    }

    /// `OPEN -> CLOSED`. No-op if already closed. Tears down leaf-first: watchers,
    /// then fan-in, then controller, then rate limiter. Each step is best-effort.
    pub async fn close(&self) {
        if self.state.load() == ThrottlerState::Closed {
            return;
        }

        let watchers = self.watchers.lock().expect("watchers lock poisoned").take();
        if let Some(watchers) = watchers {
            watchers.stop();
        }

        let fanin = self.fanin.lock().expect("fan-in lock poisoned").take();
        if let Some(fanin) = fanin {
            fanin.stop().await;
        }

        let controller = self.controller.lock().expect("controller lock poisoned").take();
        if let Some(controller) = controller {
            controller.close().await;
        }

        let limiter = self.limiter.lock().expect("limiter lock poisoned").take();
        if let Some(limiter) = limiter {
            limiter.close();
        }

        let target_name = self.target_label.read().expect("target label lock poisoned").to_string();
        self.transition(ThrottlerState::Open, ThrottlerState::Closed, &target_name);
    }

    /// The hot path. Returns `true` when the caller should back off.
    ///
    /// # Panics
    ///
    /// Panics if called while `CLOSED` with `enabled = true`: that combination is
    /// only reachable by calling `throttle()` before `open()` has completed, which
    /// is a caller bug, not a runtime condition to recover from.
    pub fn throttle(&self) -> bool {
        match self.state.load() {
            ThrottlerState::Closed => {
                let enabled = self.config.read().expect("config lock poisoned").enabled;
                if enabled {
                    panic!(
                        "throttle() called on a CLOSED, enabled throttler; call open() first"
                    );
                }
                self.record_admission_metric(true);
                false
            }
            ThrottlerState::Open => {
                let limiter = self
                    .limiter
                    .lock()
                    .expect("limiter lock poisoned")
                    .clone();
                let admit = match limiter {
                    Some(limiter) => limiter.request_admission(CALLER_ID) == Duration::ZERO,
                    None => true,
                };
                self.record_admission_metric(admit);
                !admit
            }
        }
    }

    /// A read-only, lock-cheap snapshot of current state for status endpoints.
    pub fn snapshot(&self) -> ThrottlerSnapshot {
        let config = self.config.read().expect("config lock poisoned");
        let controller = self.controller.lock().expect("controller lock poisoned").clone();
        ThrottlerSnapshot {
            enabled: config.enabled,
            is_open: self.state.load() == ThrottlerState::Open,
            current_max_rate: controller.as_ref().map(|c| c.current_rate()).unwrap_or(0.0),
            aggregate_lag_seconds: controller.as_ref().and_then(|c| c.last_aggregate_lag_seconds()),
            target: self.target.lock().expect("target lock poisoned").clone(),
        }
    }

    fn transition(&self, from: ThrottlerState, to: ThrottlerState, target_name: &str) {
        self.state.store(to);

        #[cfg(feature = "tracing")]
        tracing::info!(target_name, ?from, ?to, "throttler state transition");

        #[cfg(feature = "metrics")]
        metrics::gauge!("throttler_state", "target" => target_name.to_string())
            .set(if to == ThrottlerState::Open { 1.0 } else { 0.0 });

        self.config
            .read()
            .expect("config lock poisoned")
            .facade_listeners
            .emit(&ThrottlerFacadeEvent::StateTransition {
                target: target_name.to_string(),
                timestamp: self.clock.now(),
                from_state: from,
                to_state: to,
            });
    }

    fn record_admission_metric(&self, admit: bool) {
        #[cfg(feature = "metrics")]
        {
            let target_name = self.target_label.read().expect("target label lock poisoned").to_string();
            metrics::counter!(
                "throttler_admissions_total",
                "target" => target_name,
                "outcome" => if admit { "admit" } else { "deny" }
            )
            .increment(1);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = admit;
    }
}
