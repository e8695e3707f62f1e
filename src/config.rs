//! Top-level throttler configuration: the master switch, the cells to observe,
//! the lag target, and the controller tuning block.

use crate::events::ThrottlerFacadeEvent;
use throttler_controller::ControllerParams;
use throttler_core::{ConfigError, EventListeners, FnListener};

/// Immutable configuration for a [`crate::Throttler`].
///
/// Constructed only through [`ThrottlerConfig::builder`]. Unlike
/// [`ControllerParams`], an invalid `ThrottlerConfig` is never fatal to build: see
/// [`crate::Throttler::new`]'s construction-time policy, which falls back to a
/// disabled throttler rather than propagating this type's validation error.
#[derive(Clone)]
pub struct ThrottlerConfig {
    pub(crate) enabled: bool,
    pub(crate) observation_cells: Vec<String>,
    pub(crate) max_replication_lag_seconds: f64,
    pub(crate) controller_params: ControllerParams,
    pub(crate) facade_listeners: EventListeners<ThrottlerFacadeEvent>,
}

impl std::fmt::Debug for ThrottlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottlerConfig")
            .field("enabled", &self.enabled)
            .field("observation_cells", &self.observation_cells)
            .field("max_replication_lag_seconds", &self.max_replication_lag_seconds)
            .field("controller_params", &self.controller_params)
            .field("facade_listeners_count", &self.facade_listeners.len())
            .finish()
    }
}

impl ThrottlerConfig {
    pub fn builder() -> ThrottlerConfigBuilder {
        ThrottlerConfigBuilder::new()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn observation_cells(&self) -> &[String] {
        &self.observation_cells
    }

    pub fn max_replication_lag_seconds(&self) -> f64 {
        self.max_replication_lag_seconds
    }

    pub fn controller_params(&self) -> &ControllerParams {
        &self.controller_params
    }

    /// A degenerate, always-valid configuration with `enabled = false`. Used as the
    /// fallback when a caller-supplied configuration fails validation.
    pub(crate) fn disabled() -> Self {
        Self {
            enabled: false,
            observation_cells: Vec::new(),
            max_replication_lag_seconds: 1.0,
            controller_params: ControllerParams::default(),
            facade_listeners: EventListeners::new(),
        }
    }
}

/// Builder for [`ThrottlerConfig`].
pub struct ThrottlerConfigBuilder {
    enabled: bool,
    observation_cells: Vec<String>,
    max_replication_lag_seconds: f64,
    controller_params: ControllerParams,
    facade_listeners: EventListeners<ThrottlerFacadeEvent>,
}

impl ThrottlerConfigBuilder {
    pub fn new() -> Self {
        Self {
            enabled: true,
            observation_cells: Vec::new(),
            max_replication_lag_seconds: 5.0,
            controller_params: ControllerParams::default(),
            facade_listeners: EventListeners::new(),
        }
    }

    /// Master switch. When `false`, the built throttler degenerates to a permanent
    /// "admit" and every other field is ignored.
    ///
    /// Default: `true`.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Cells whose replicas contribute lag samples. Must be non-empty when
    /// `enabled` is `true`.
    ///
    /// Default: empty.
    pub fn observation_cells<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observation_cells = cells.into_iter().map(Into::into).collect();
        self
    }

    /// The replication lag ceiling the controller targets.
    ///
    /// Default: 5.0 seconds.
    pub fn max_replication_lag_seconds(mut self, seconds: f64) -> Self {
        self.max_replication_lag_seconds = seconds;
        self
    }

    /// Tuning block passed verbatim to the lag-driven rate controller.
    ///
    /// Default: [`ControllerParams::default`].
    pub fn controller_params(mut self, params: ControllerParams) -> Self {
        self.controller_params = params;
        self
    }

    /// Registers a callback invoked whenever the facade transitions between
    /// `CLOSED` and `OPEN`. Arguments are `(was_open, is_open)`.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(bool, bool) + Send + Sync + 'static,
    {
        self.facade_listeners
            .add(FnListener::new(move |event: &ThrottlerFacadeEvent| {
                let ThrottlerFacadeEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event;
                f(
                    *from_state == crate::state::ThrottlerState::Open,
                    *to_state == crate::state::ThrottlerState::Open,
                );
            }));
        self
    }

    /// Registers a callback invoked whenever the controller pushes a new rate.
    pub fn on_rate_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.controller_params = reattach_rate_listener(self.controller_params, f);
        self
    }

    /// Validates `observation_cells` and `max_replication_lag_seconds` and builds a
    /// [`ThrottlerConfig`]. `controller_params` is validated separately by its own
    /// builder before it can be handed to this one, so it is trusted here.
    pub fn build(self) -> Result<ThrottlerConfig, ConfigError> {
        if self.enabled && self.observation_cells.is_empty() {
            return Err(ConfigError::NoObservationCells);
        }
        if self.enabled && !(self.max_replication_lag_seconds > 0.0) {
            return Err(ConfigError::NonPositiveLagTarget {
                value: self.max_replication_lag_seconds,
            });
        }

        Ok(ThrottlerConfig {
            enabled: self.enabled,
            observation_cells: self.observation_cells,
            max_replication_lag_seconds: self.max_replication_lag_seconds,
            controller_params: self.controller_params,
            facade_listeners: self.facade_listeners,
        })
    }
}

impl Default for ThrottlerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `ControllerParams` has no public way to append a listener after construction
/// (only the controller builder does), so `on_rate_changed` rebuilds it through a
/// fresh builder seeded from the existing params' public accessors.
fn reattach_rate_listener<F>(params: ControllerParams, f: F) -> ControllerParams
where
    F: Fn(f64) + Send + Sync + 'static,
{
    ControllerParams::builder()
        .evaluation_interval(params.evaluation_interval())
        .staleness_window(params.staleness_window())
        .rate_floor(params.rate_floor())
        .rate_ceiling(params.rate_ceiling())
        .initial_rate(params.initial_rate())
        .increase_by(params.increase_by())
        .decrease_factor(params.decrease_factor())
        .high_water_multiplier(params.high_water_multiplier())
        .on_rate_changed(move |_old, new| f(new))
        .build()
        .expect("params were already valid before reattaching a listener")
}
