//! Shared infrastructure for the transaction throttler.
//!
//! This crate provides the pieces every throttler component needs but none of them
//! owns outright:
//! - domain identifiers (cells, targets, tablet health samples)
//! - capability traits for the external collaborators (topology, health stream, clock, logger)
//! - an event system for observability, independent of `tracing`/`metrics`
//! - the error taxonomy surfaced across crate boundaries

pub mod capabilities;
pub mod error;
pub mod events;
pub mod types;

pub use capabilities::{Clock, HealthStream, Logger, SystemClock, TopologyService, TracingLogger};
pub use error::{CapabilityError, ConfigError, ThrottlerError};
pub use events::{EventListener, EventListeners, FnListener, ThrottlerEvent};
pub use types::{Target, TabletHealthSample, TabletIdentity, TabletRole};
