//! Events emitted by the lag-driven rate controller.

use std::time::Instant;
use throttler_core::ThrottlerEvent;

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// The controller pushed a new max rate into the rate limiter.
    RateChanged {
        target: String,
        old_rate: f64,
        new_rate: f64,
        aggregate_lag_seconds: f64,
        timestamp: Instant,
    },
    /// An evaluation tick ran but had no usable samples to act on.
    EvaluationSkippedNoSamples { target: String, timestamp: Instant },
    /// The controller's tuning parameters were replaced.
    ConfigurationUpdated { target: String, timestamp: Instant },
}

impl ThrottlerEvent for ControllerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ControllerEvent::RateChanged { .. } => "rate_changed",
            ControllerEvent::EvaluationSkippedNoSamples { .. } => "evaluation_skipped_no_samples",
            ControllerEvent::ConfigurationUpdated { .. } => "configuration_updated",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ControllerEvent::RateChanged { timestamp, .. }
            | ControllerEvent::EvaluationSkippedNoSamples { timestamp, .. }
            | ControllerEvent::ConfigurationUpdated { timestamp, .. } => *timestamp,
        }
    }

    fn target_name(&self) -> &str {
        match self {
            ControllerEvent::RateChanged { target, .. }
            | ControllerEvent::EvaluationSkippedNoSamples { target, .. }
            | ControllerEvent::ConfigurationUpdated { target, .. } => target,
        }
    }
}
