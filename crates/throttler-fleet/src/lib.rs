//! Keeps the lag controller fed: fleet watchers track which tablets exist per
//! cell, and the health fan-in turns the external health stream into
//! [`throttler_controller::Controller::record_lag`] calls.

mod fanin;
mod watchers;

pub use fanin::HealthFanIn;
pub use watchers::FleetWatcherSet;
