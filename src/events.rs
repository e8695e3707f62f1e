//! Facade-level events: lifecycle transitions that sit above the per-component
//! events already emitted by [`throttler_controller::ControllerEvent`].

use crate::state::ThrottlerState;
use std::time::Instant;
use throttler_core::ThrottlerEvent;

/// Emitted by a [`crate::Throttler`] itself, as opposed to its subordinate
/// controller.
#[derive(Debug, Clone)]
pub enum ThrottlerFacadeEvent {
    /// `open()` or `close()` changed the lifecycle state.
    StateTransition {
        target: String,
        timestamp: Instant,
        from_state: ThrottlerState,
        to_state: ThrottlerState,
    },
}

impl ThrottlerEvent for ThrottlerFacadeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ThrottlerFacadeEvent::StateTransition { .. } => "state_transition",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ThrottlerFacadeEvent::StateTransition { timestamp, .. } => *timestamp,
        }
    }

    fn target_name(&self) -> &str {
        match self {
            ThrottlerFacadeEvent::StateTransition { target, .. } => target,
        }
    }
}
