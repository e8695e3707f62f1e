//! The lag-driven rate controller.

use crate::config::ControllerParams;
use crate::events::ControllerEvent;
use crate::policy::{AimdRatePolicy, TickOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use throttler_core::{Clock, Logger, TabletHealthSample, TabletIdentity};
use throttler_limiter::RateLimiter;

/// Runs the evaluation loop that translates replication lag into a max admission rate.
pub struct Controller {
    target_name: String,
    max_replication_lag_seconds: f64,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    policy: Arc<AimdRatePolicy>,
    samples: Arc<std::sync::Mutex<HashMap<TabletIdentity, TabletHealthSample>>>,
    params: Arc<RwLock<ControllerParams>>,
    eval_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    ever_received_sample: Arc<AtomicBool>,
    last_aggregate_lag_bits: AtomicU64,
}

impl Controller {
    pub fn new(
        target_name: impl Into<String>,
        max_replication_lag_seconds: f64,
        params: ControllerParams,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let policy = Arc::new(AimdRatePolicy::new(
            params.initial_rate(),
            params.rate_floor(),
            params.rate_ceiling(),
            params.increase_by,
            params.decrease_factor,
        ));
        limiter.set_max_rate(policy.rate());

        Self {
            target_name: target_name.into(),
            max_replication_lag_seconds,
            limiter,
            clock,
            logger,
            policy,
            samples: Arc::new(std::sync::Mutex::new(HashMap::new())),
            params: Arc::new(RwLock::new(params)),
            eval_task: Arc::new(RwLock::new(None)),
            ever_received_sample: Arc::new(AtomicBool::new(false)),
            last_aggregate_lag_bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    /// The most recently computed aggregate lag, or `None` if no evaluation tick
    /// has ever found a usable sample.
    pub fn last_aggregate_lag_seconds(&self) -> Option<f64> {
        let value = f64::from_bits(self.last_aggregate_lag_bits.load(Ordering::Relaxed));
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    /// Records a lag sample from a single replica. Non-blocking.
    pub fn record_lag(&self, sample: TabletHealthSample) {
        self.ever_received_sample.store(true, Ordering::Relaxed);
        let mut samples = self.samples.lock().expect("controller sample mutex poisoned");
        samples.insert(sample.tablet.clone(), sample);
    }

    pub async fn update_configuration(&self, new_params: ControllerParams, copy_zero_values: bool) {
        let mut guard = self.params.write().await;
        guard.merge_from(new_params, copy_zero_values);
        guard.event_listeners.emit(&ControllerEvent::ConfigurationUpdated {
            target: self.target_name.clone(),
            timestamp: self.clock.now(),
        });
    }

    pub async fn reset_configuration(&self) {
        let mut guard = self.params.write().await;
        *guard = ControllerParams::default();
    }

    pub async fn get_configuration(&self) -> ControllerParams {
        self.params.read().await.clone()
    }

    /// Starts the background evaluation loop.
    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);

        let task = tokio::spawn(async move {
            loop {
                let interval = this.params.read().await.evaluation_interval;
                tokio::time::sleep(interval).await;
                this.evaluate_tick().await;
            }
        });

        let mut guard = self.eval_task.write().await;
        *guard = Some(task);
    }

    /// Stops the background evaluation loop. Idempotent.
    pub async fn stop(&self) {
        let mut guard = self.eval_task.write().await;
        if let Some(task) = guard.take() {
            task.abort();
        }
    }

    async fn evaluate_tick(&self) {
        let params = self.params.read().await.clone();
        let now = self.clock.now();

        let aggregate_lag = {
            let mut samples = self.samples.lock().expect("controller sample mutex poisoned");
            samples.retain(|_, sample| {
                sample.is_usable() && now.saturating_duration_since(sample.received_at) <= params.staleness_window
            });

            samples
                .values()
                .map(|s| s.replication_lag_seconds)
                .fold(None, |acc: Option<f64>, lag| {
                    Some(acc.map_or(lag, |a| a.max(lag)))
                })
        };

        let Some(aggregate_lag) = aggregate_lag else {
            if self.ever_received_sample.load(Ordering::Relaxed) {
                params.event_listeners.emit(&ControllerEvent::EvaluationSkippedNoSamples {
                    target: self.target_name.clone(),
                    timestamp: now,
                });
            } else {
                self.logger.warn(&format!(
                    "throttler controller for {} has never received a lag sample; check observation_cells",
                    self.target_name
                ));
                self.ever_received_sample.store(true, Ordering::Relaxed);
            }
            return;
        };

        self.last_aggregate_lag_bits
            .store(aggregate_lag.to_bits(), Ordering::Relaxed);

        let outcome = if aggregate_lag >= self.max_replication_lag_seconds * params.high_water_multiplier {
            TickOutcome::SeverelyUnhealthy
        } else if aggregate_lag > self.max_replication_lag_seconds {
            TickOutcome::Unhealthy
        } else {
            // Strictly at or below target: treat as healthy. A sample sitting
            // exactly on the target must not be punished for noise alone.
            TickOutcome::Healthy
        };

        let (old_rate, new_rate) = self.policy.apply(outcome);
        if new_rate != old_rate {
            self.limiter.set_max_rate(new_rate);
            params.event_listeners.emit(&ControllerEvent::RateChanged {
                target: self.target_name.clone(),
                old_rate,
                new_rate,
                aggregate_lag_seconds: aggregate_lag,
                timestamp: now,
            });

            #[cfg(feature = "tracing")]
            tracing::debug!(
                target = %self.target_name,
                old_rate,
                new_rate,
                aggregate_lag_seconds = aggregate_lag,
                "throttler rate adjusted"
            );

            #[cfg(feature = "metrics")]
            {
                let target_label = self.target_name.clone();
                metrics::gauge!("throttler_max_rate", "target" => target_label.clone()).set(new_rate);
                metrics::gauge!("throttler_aggregate_lag_seconds", "target" => target_label).set(aggregate_lag);
            }
        }
    }

    pub fn current_rate(&self) -> f64 {
        self.policy.rate()
    }

    /// Releases all controller-owned resources. Stops the evaluation loop and
    /// discards all buffered samples.
    pub async fn close(&self) {
        self.stop().await;
        self.samples.lock().expect("controller sample mutex poisoned").clear();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(task) = self
            .eval_task
            .try_write()
            .ok()
            .and_then(|mut guard| guard.take())
        {
            task.abort();
        }
    }
}
