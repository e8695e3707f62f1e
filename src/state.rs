//! The throttler's top-level lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`crate::Throttler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThrottlerState {
    /// No subordinate components are running. `throttle()` always admits.
    Closed = 0,
    /// The rate limiter, controller, fan-in and fleet watchers are all running.
    /// `throttle()` consults the limiter.
    Open = 1,
}

impl ThrottlerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ThrottlerState::Open,
            _ => ThrottlerState::Closed,
        }
    }
}

/// An atomically-readable mirror of [`ThrottlerState`], shared with the hot path so
/// `throttle()` never has to take a lock just to check whether the throttler is open.
#[derive(Default)]
pub(crate) struct AtomicThrottlerState(AtomicU8);

impl AtomicThrottlerState {
    pub(crate) fn new(initial: ThrottlerState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub(crate) fn load(&self) -> ThrottlerState {
        ThrottlerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: ThrottlerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
