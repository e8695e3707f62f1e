//! Lag-driven admission control for write transactions against a replicated
//! shard: the public facade wiring together a rate limiter, a lag-driven rate
//! controller, a health event fan-in, and a set of fleet watchers.
//!
//! See [`Throttler`] for the entry point.

mod config;
mod events;
mod facade;
mod snapshot;
mod state;

pub use config::{ThrottlerConfig, ThrottlerConfigBuilder};
pub use events::ThrottlerFacadeEvent;
pub use facade::Throttler;
pub use snapshot::ThrottlerSnapshot;
pub use state::ThrottlerState;

pub use throttler_core::{
    CapabilityError, Clock, ConfigError, HealthStream, Logger, SystemClock, Target,
    TabletHealthSample, TabletIdentity, TabletRole, ThrottlerError, TopologyService, TracingLogger,
};
pub use throttler_controller::{ControllerParams, ControllerParamsBuilder, ControllerParamsData};
