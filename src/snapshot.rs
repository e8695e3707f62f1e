//! A read-only view of a throttler's current state, for status endpoints and
//! debug UIs. Never consulted internally — `throttle()` goes straight to the rate
//! limiter, not through a snapshot.

use throttler_core::Target;

#[derive(Debug, Clone)]
pub struct ThrottlerSnapshot {
    pub enabled: bool,
    pub is_open: bool,
    pub current_max_rate: f64,
    pub aggregate_lag_seconds: Option<f64>,
    pub target: Target,
}
