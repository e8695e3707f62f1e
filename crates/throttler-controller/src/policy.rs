//! The additive-increase/multiplicative-decrease policy applied to the pushed rate.
//!
//! This is a float-valued sibling of a classic usize-valued AIMD limit: on a
//! healthy tick the rate increases by a fixed amount; on an unhealthy tick it is
//! multiplied down. The one addition beyond a textbook AIMD is the high-water drop:
//! when lag is badly over target, waiting for several multiplicative-decrease ticks
//! to reach a safe rate is too slow, so the policy jumps straight to the floor.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of one evaluation tick, already reduced to "is this tick healthy".
pub enum TickOutcome {
    Healthy,
    Unhealthy,
    SeverelyUnhealthy,
}

pub struct AimdRatePolicy {
    rate_bits: AtomicU64,
    floor: f64,
    ceiling: f64,
    increase_by: f64,
    decrease_factor: f64,
}

impl AimdRatePolicy {
    pub fn new(initial_rate: f64, floor: f64, ceiling: f64, increase_by: f64, decrease_factor: f64) -> Self {
        Self {
            rate_bits: AtomicU64::new(initial_rate.clamp(floor, ceiling).to_bits()),
            floor,
            ceiling,
            increase_by,
            decrease_factor,
        }
    }

    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    /// Applies one tick's outcome and returns `(old_rate, new_rate)`.
    pub fn apply(&self, outcome: TickOutcome) -> (f64, f64) {
        let old = self.rate();
        let new = match outcome {
            TickOutcome::Healthy => (old + self.increase_by).min(self.ceiling),
            TickOutcome::Unhealthy => (old * self.decrease_factor).max(self.floor),
            TickOutcome::SeverelyUnhealthy => self.floor,
        };
        self.rate_bits.store(new.to_bits(), Ordering::Relaxed);
        (old, new)
    }
}
