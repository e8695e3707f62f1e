//! Tuning parameters for the lag-driven rate controller.

use crate::events::ControllerEvent;
use std::time::Duration;
use throttler_core::{ConfigError, EventListeners, FnListener};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque tuning block for the lag-driven rate controller.
///
/// Constructed only through [`ControllerParams::builder`]; `build()` validates every
/// field and returns a [`ConfigError`] rather than panicking, because a malformed
/// controller configuration must fall back to a safe default, not crash the host
/// process.
#[derive(Clone)]
pub struct ControllerParams {
    pub(crate) evaluation_interval: Duration,
    pub(crate) staleness_window: Duration,
    pub(crate) rate_floor: f64,
    pub(crate) rate_ceiling: f64,
    pub(crate) initial_rate: f64,
    pub(crate) increase_by: f64,
    pub(crate) decrease_factor: f64,
    pub(crate) high_water_multiplier: f64,
    pub(crate) event_listeners: EventListeners<ControllerEvent>,
}

impl std::fmt::Debug for ControllerParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerParams")
            .field("evaluation_interval", &self.evaluation_interval)
            .field("staleness_window", &self.staleness_window)
            .field("rate_floor", &self.rate_floor)
            .field("rate_ceiling", &self.rate_ceiling)
            .field("initial_rate", &self.initial_rate)
            .field("increase_by", &self.increase_by)
            .field("decrease_factor", &self.decrease_factor)
            .field("high_water_multiplier", &self.high_water_multiplier)
            .field("event_listeners_count", &self.event_listeners.len())
            .finish()
    }
}

impl ControllerParams {
    pub fn builder() -> ControllerParamsBuilder {
        ControllerParamsBuilder::new()
    }

    pub fn evaluation_interval(&self) -> Duration {
        self.evaluation_interval
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    pub fn rate_floor(&self) -> f64 {
        self.rate_floor
    }

    pub fn rate_ceiling(&self) -> f64 {
        self.rate_ceiling
    }

    pub fn initial_rate(&self) -> f64 {
        self.initial_rate
    }

    pub fn increase_by(&self) -> f64 {
        self.increase_by
    }

    pub fn decrease_factor(&self) -> f64 {
        self.decrease_factor
    }

    pub fn high_water_multiplier(&self) -> f64 {
        self.high_water_multiplier
    }

    /// Replaces `self` with fields copied from `other`. When `copy_zero_values` is
    /// `false`, a zero-valued numeric field or zero-duration field in `other` is
    /// treated as "unset" and the existing value is kept instead.
    pub(crate) fn merge_from(&mut self, other: ControllerParams, copy_zero_values: bool) {
        if copy_zero_values {
            *self = other;
            return;
        }
        if other.evaluation_interval != Duration::ZERO {
            self.evaluation_interval = other.evaluation_interval;
        }
        if other.staleness_window != Duration::ZERO {
            self.staleness_window = other.staleness_window;
        }
        if other.rate_floor != 0.0 {
            self.rate_floor = other.rate_floor;
        }
        if other.rate_ceiling != 0.0 {
            self.rate_ceiling = other.rate_ceiling;
        }
        if other.initial_rate != 0.0 {
            self.initial_rate = other.initial_rate;
        }
        if other.increase_by != 0.0 {
            self.increase_by = other.increase_by;
        }
        if other.decrease_factor != 0.0 {
            self.decrease_factor = other.decrease_factor;
        }
        if other.high_water_multiplier != 0.0 {
            self.high_water_multiplier = other.high_water_multiplier;
        }
        self.event_listeners = other.event_listeners;
    }
}

impl Default for ControllerParams {
    fn default() -> Self {
        ControllerParamsBuilder::new()
            .build()
            .expect("default controller params are always valid")
    }
}

/// Builder for [`ControllerParams`].
pub struct ControllerParamsBuilder {
    evaluation_interval: Duration,
    staleness_window: Duration,
    rate_floor: f64,
    rate_ceiling: f64,
    initial_rate: f64,
    increase_by: f64,
    decrease_factor: f64,
    high_water_multiplier: f64,
    event_listeners: EventListeners<ControllerEvent>,
}

impl ControllerParamsBuilder {
    pub fn new() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(1),
            staleness_window: Duration::from_secs(30),
            rate_floor: 1.0,
            rate_ceiling: 10_000.0,
            initial_rate: 100.0,
            increase_by: 10.0,
            decrease_factor: 0.5,
            high_water_multiplier: 2.0,
            event_listeners: EventListeners::new(),
        }
    }

    /// How often the controller re-evaluates aggregate lag and adjusts the rate.
    ///
    /// Default: 1 second.
    pub fn evaluation_interval(mut self, interval: Duration) -> Self {
        self.evaluation_interval = interval;
        self
    }

    /// Samples older than this are excluded from the aggregate lag computation.
    ///
    /// Default: 30 seconds.
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// The lowest rate the controller will push while the throttler is enabled.
    ///
    /// Default: 1.0 requests/second.
    pub fn rate_floor(mut self, floor: f64) -> Self {
        self.rate_floor = floor;
        self
    }

    /// The highest rate the controller will push.
    ///
    /// Default: 10,000.0 requests/second.
    pub fn rate_ceiling(mut self, ceiling: f64) -> Self {
        self.rate_ceiling = ceiling;
        self
    }

    /// The rate pushed into the limiter before the first evaluation tick runs.
    ///
    /// Default: 100.0 requests/second.
    pub fn initial_rate(mut self, rate: f64) -> Self {
        self.initial_rate = rate;
        self
    }

    /// Additive increase applied per tick while aggregate lag is below target.
    ///
    /// Default: 10.0 requests/second.
    pub fn increase_by(mut self, amount: f64) -> Self {
        self.increase_by = amount;
        self
    }

    /// Multiplicative decrease factor applied per tick while aggregate lag is at or
    /// above target but below the high-water threshold.
    ///
    /// Default: 0.5 (halve the rate).
    pub fn decrease_factor(mut self, factor: f64) -> Self {
        self.decrease_factor = factor;
        self
    }

    /// When aggregate lag reaches `max_replication_lag_seconds * high_water_multiplier`,
    /// the controller drops straight to `rate_floor` instead of decreasing gradually.
    ///
    /// Default: 2.0.
    pub fn high_water_multiplier(mut self, multiplier: f64) -> Self {
        self.high_water_multiplier = multiplier;
        self
    }

    /// Registers a callback invoked whenever the controller pushes a new rate.
    pub fn on_rate_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, f64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &ControllerEvent| {
            if let ControllerEvent::RateChanged {
                old_rate, new_rate, ..
            } = event
            {
                f(*old_rate, *new_rate);
            }
        }));
        self
    }

    /// Validates every field and builds a [`ControllerParams`].
    pub fn build(self) -> Result<ControllerParams, ConfigError> {
        if self.evaluation_interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval {
                value: self.evaluation_interval,
            });
        }
        if self.staleness_window < self.evaluation_interval {
            return Err(ConfigError::StalenessWindowTooShort {
                staleness: self.staleness_window,
                interval: self.evaluation_interval,
            });
        }
        if self.rate_floor > self.rate_ceiling {
            return Err(ConfigError::FloorExceedsCeiling {
                floor: self.rate_floor,
                ceiling: self.rate_ceiling,
            });
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(ConfigError::InvalidDecreaseFactor {
                value: self.decrease_factor,
            });
        }

        Ok(ControllerParams {
            evaluation_interval: self.evaluation_interval,
            staleness_window: self.staleness_window,
            rate_floor: self.rate_floor,
            rate_ceiling: self.rate_ceiling,
            initial_rate: self.initial_rate.clamp(self.rate_floor, self.rate_ceiling),
            increase_by: self.increase_by,
            decrease_factor: self.decrease_factor,
            high_water_multiplier: self.high_water_multiplier,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for ControllerParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-data mirror of [`ControllerParams`], carrying no event listeners, for
/// loading tuning parameters from YAML/TOML/JSON. Convert with
/// [`ControllerParamsBuilder::from_data`], then `.build()` as usual to validate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct ControllerParamsData {
    pub evaluation_interval_ms: u64,
    pub staleness_window_ms: u64,
    pub rate_floor: f64,
    pub rate_ceiling: f64,
    pub initial_rate: f64,
    pub increase_by: f64,
    pub decrease_factor: f64,
    pub high_water_multiplier: f64,
}

impl ControllerParamsBuilder {
    /// Seeds a builder from a deserialized [`ControllerParamsData`]. Still requires
    /// `.build()` to validate the resulting fields.
    pub fn from_data(data: ControllerParamsData) -> Self {
        Self::new()
            .evaluation_interval(Duration::from_millis(data.evaluation_interval_ms))
            .staleness_window(Duration::from_millis(data.staleness_window_ms))
            .rate_floor(data.rate_floor)
            .rate_ceiling(data.rate_ceiling)
            .initial_rate(data.initial_rate)
            .increase_by(data.increase_by)
            .decrease_factor(data.decrease_factor)
            .high_water_multiplier(data.high_water_multiplier)
    }
}
