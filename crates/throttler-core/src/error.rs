//! Error taxonomy for the throttler.
//!
//! Three error types, matching three different call sites:
//! - [`ConfigError`] is returned by controller-parameter validation.
//! - [`CapabilityError`] is returned by the topology/health-stream capability traits.
//! - [`ThrottlerError`] is the facade-level error surfaced from `new`/`open`; it wraps
//!   the other two so callers who only care about the outer error still get a useful
//!   `Display` message, and callers who want field-level detail can match through.
//!
//! Background-transient failures (a topology read timing out, one missed health
//! event) are deliberately not represented here: they are logged at the point they
//! occur and never cross a crate boundary, per the "only surface what the caller can
//! act on" rule this taxonomy follows throughout.

use std::fmt;
use std::time::Duration;

/// A single invalid field in a [`crate::capabilities`] consumer's tuning parameters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("observation_cells must contain at least one cell when the throttler is enabled")]
    NoObservationCells,

    #[error("max_replication_lag_seconds must be positive, got {value}")]
    NonPositiveLagTarget { value: f64 },

    #[error("rate_floor ({floor}) must not exceed rate_ceiling ({ceiling})")]
    FloorExceedsCeiling { floor: f64, ceiling: f64 },

    #[error("decrease_factor must be in (0.0, 1.0), got {value}")]
    InvalidDecreaseFactor { value: f64 },

    #[error("evaluation_interval must be positive, got {value:?}")]
    NonPositiveInterval { value: Duration },

    #[error("staleness_window ({staleness:?}) must be at least evaluation_interval ({interval:?})")]
    StalenessWindowTooShort {
        staleness: Duration,
        interval: Duration,
    },
}

/// An error from a capability trait implementation (topology lookup, health stream
/// subscription). These are background-transient by nature; the facade never
/// propagates them past `open()` rollback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("topology lookup for cell {cell:?} failed: {reason}")]
    TopologyUnavailable { cell: String, reason: String },

    #[error("health stream subscription failed: {reason}")]
    SubscriptionFailed { reason: String },
}

/// The facade-level error type, returned from `Throttler::new` and `Throttler::open`.
#[derive(Debug, Clone)]
pub enum ThrottlerError {
    /// The supplied configuration failed validation. The facade does not return this
    /// from `new` — construction always succeeds, falling back to a disabled
    /// throttler and logging a warning — but it is returned from `open()` so a caller
    /// retrying after fixing configuration gets a precise reason.
    InvalidConfiguration(ConfigError),
    /// `open()` failed to construct one of its subordinate components. Any
    /// subordinates already constructed during this attempt have been rolled back;
    /// the throttler remains `CLOSED`.
    OpenFailed(CapabilityError),
}

impl fmt::Display for ThrottlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottlerError::InvalidConfiguration(e) => {
                write!(f, "invalid throttler configuration: {e}")
            }
            ThrottlerError::OpenFailed(e) => write!(f, "failed to open throttler: {e}"),
        }
    }
}

impl std::error::Error for ThrottlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThrottlerError::InvalidConfiguration(e) => Some(e),
            ThrottlerError::OpenFailed(e) => Some(e),
        }
    }
}

impl ThrottlerError {
    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, ThrottlerError::InvalidConfiguration(_))
    }

    pub fn is_open_failed(&self) -> bool {
        matches!(self, ThrottlerError::OpenFailed(_))
    }

    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            ThrottlerError::InvalidConfiguration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for ThrottlerError {
    fn from(e: ConfigError) -> Self {
        ThrottlerError::InvalidConfiguration(e)
    }
}

impl From<CapabilityError> for ThrottlerError {
    fn from(e: CapabilityError) -> Self {
        ThrottlerError::OpenFailed(e)
    }
}

const _: () = {
    const fn assert_send_sync_static<T: Send + Sync + 'static>() {}
    let _ = assert_send_sync_static::<ThrottlerError>;
    let _ = assert_send_sync_static::<ConfigError>;
    let _ = assert_send_sync_static::<CapabilityError>;
};
