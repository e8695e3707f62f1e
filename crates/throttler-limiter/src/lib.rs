//! The rate limiter core: a per-caller next-eligible-timestamp admission gate.
//!
//! This is deliberately the dumbest component in the throttler. It does not know
//! anything about replication lag, health streams, or topology — it only knows how
//! to space out admissions for a given caller at a configured rate, and to let the
//! rate be changed out from under it at any time. The intelligence that decides
//! *what rate* lives one layer up, in the lag-driven controller.
//!
//! The algorithm is a single-resource simplification of the generic cell rate
//! algorithm: each caller has a "next eligible" instant. A request is admitted when
//! the clock has passed that instant, which then advances by `1 / max_rate`; a
//! request made earlier is denied and told how long it has left to wait. Unlike a
//! full GCRA implementation this tracks only the two states a caller can be in
//! (eligible now, or waiting), not a burst allowance — the lag controller already
//! smooths the rate it pushes down, so a burst budget on top would just add a second
//! place bursts could hide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use throttler_core::Clock;

/// Identifies a caller of [`RateLimiter::request_admission`]. The throttler facade
/// uses a single fixed id for all transactions (see the facade's design notes on
/// caller identity), but the limiter itself is not restricted to one caller.
pub type CallerId = u32;

/// Sentinel `max_rate` meaning "unconstrained": every request admits immediately.
pub const DISABLED_RATE: f64 = f64::INFINITY;

/// Returned by [`RateLimiter::request_admission`] when the configured rate is
/// exactly zero. There is no meaningful "time until eligible" when the rate itself
/// is zero, so callers are told to wait a fixed, conservatively long interval and
/// to re-check after the rate next changes.
const ZERO_RATE_BACKOFF: Duration = Duration::from_secs(60);

/// A thread-safe, runtime-adjustable admission limiter.
pub struct RateLimiter {
    max_rate_bits: AtomicU64,
    next_eligible: Mutex<HashMap<CallerId, Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter with the given initial rate (requests per second).
    pub fn new(initial_rate: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_rate_bits: AtomicU64::new(initial_rate.to_bits()),
            next_eligible: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns `Duration::ZERO` when `caller` may proceed now, advancing its next
    /// eligible instant by `1 / max_rate`. Otherwise returns the time the caller
    /// still has to wait; the caller's next-eligible instant is left untouched so
    /// retrying before that duration elapses keeps returning a (shrinking) wait.
    pub fn request_admission(&self, caller: CallerId) -> Duration {
        let rate = self.get_max_rate();
        if rate == DISABLED_RATE {
            return Duration::ZERO;
        }
        if rate <= 0.0 {
            return ZERO_RATE_BACKOFF;
        }

        let interval = Duration::from_secs_f64(1.0 / rate);
        let now = self.clock.now();

        let mut table = self.next_eligible.lock().expect("rate limiter mutex poisoned");
        let eligible_at = *table.get(&caller).unwrap_or(&now);

        if now >= eligible_at {
            table.insert(caller, now + interval);
            Duration::ZERO
        } else {
            eligible_at - now
        }
    }

    /// Updates the admission rate. Takes effect on the next `request_admission`
    /// call; already-waiting callers are not retroactively admitted or denied.
    pub fn set_max_rate(&self, rate_per_second: f64) {
        self.max_rate_bits
            .store(rate_per_second.to_bits(), Ordering::Relaxed);
    }

    pub fn get_max_rate(&self) -> f64 {
        f64::from_bits(self.max_rate_bits.load(Ordering::Relaxed))
    }

    /// Forgets a caller's next-eligible state. Intended for shutdown bookkeeping;
    /// harmless to call on an unknown caller.
    pub fn release(&self, caller: CallerId) {
        self.next_eligible
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(&caller);
    }

    /// Releases all internal state.
    pub fn close(&self) {
        self.next_eligible
            .lock()
            .expect("rate limiter mutex poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert;

    struct FixedClock(Mutex<Instant>);

    impl FixedClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Instant::now())))
        }

        fn advance(&self, d: Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += d;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[test]
    fn disabled_rate_always_admits() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(DISABLED_RATE, clock);
        for _ in 0..1000 {
            assert_eq!(limiter.request_admission(0), Duration::ZERO);
        }
    }

    #[test]
    fn zero_rate_always_denies() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(0.0, clock);
        assert!(limiter.request_admission(0) > Duration::ZERO);
    }

    #[test]
    fn admits_at_configured_rate_then_denies_until_interval_elapses() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(2.0, clock.clone());

        assert_eq!(limiter.request_admission(0), Duration::ZERO);
        let wait = limiter.request_admission(0);
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(500));

        clock.advance(Duration::from_millis(500));
        assert_eq!(limiter.request_admission(0), Duration::ZERO);
    }

    #[test]
    fn distinct_callers_do_not_share_eligibility() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(1.0, clock);

        assert_eq!(limiter.request_admission(1), Duration::ZERO);
        assert_eq!(limiter.request_admission(2), Duration::ZERO);
        assert!(limiter.request_admission(1) > Duration::ZERO);
    }

    #[test]
    fn set_max_rate_is_observed_by_get_max_rate() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(5.0, clock);
        limiter.set_max_rate(42.0);
        assert_eq!(limiter.get_max_rate(), 42.0);
    }

    #[test]
    fn release_forgets_caller_state() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(1.0, clock);
        limiter.request_admission(7);
        limiter.release(7);
        // a freed caller is treated as never-seen and admits immediately again
        assert_eq!(limiter.request_admission(7), Duration::ZERO);
    }

    #[test]
    fn close_clears_all_callers() {
        let clock = FixedClock::new();
        let limiter = RateLimiter::new(1.0, clock);
        limiter.request_admission(1);
        limiter.request_admission(2);
        limiter.close();
        assert_eq!(limiter.request_admission(1), Duration::ZERO);
        assert_eq!(limiter.request_admission(2), Duration::ZERO);
    }

    proptest::proptest! {
        #[test]
        fn admission_rate_never_exceeds_configured_rate(rate in 1.0f64..100.0) {
            let clock = FixedClock::new();
            let limiter = RateLimiter::new(rate, clock.clone());
            let mut admitted = 0u32;
            let ticks = 1000;
            let step = Duration::from_millis(1);
            for _ in 0..ticks {
                if limiter.request_admission(0) == Duration::ZERO {
                    admitted += 1;
                }
                clock.advance(step);
            }
            let elapsed_seconds = ticks as f64 * step.as_secs_f64();
            let max_allowed = (rate * elapsed_seconds).ceil() as u32 + 1;
            prop_assert!(admitted <= max_allowed);
        }
    }
}
