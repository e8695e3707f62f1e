//! The lag-driven rate controller: turns a stream of replica lag samples into a
//! max admission rate, pushed into a [`throttler_limiter::RateLimiter`].

mod config;
mod controller;
mod events;
mod policy;

pub use config::{ControllerParams, ControllerParamsBuilder, ControllerParamsData};
pub use controller::Controller;
pub use events::ControllerEvent;
pub use policy::{AimdRatePolicy, TickOutcome};
