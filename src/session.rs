//! Session lock state, driven by OS lock/unlock notifications.

use crate::mode::SessionState;

/// The two notifications a session source delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Lock,
    Unlock,
}

impl SessionEvent {
    fn target(self) -> SessionState {
        match self {
            SessionEvent::Lock => SessionState::Locked,
            SessionEvent::Unlock => SessionState::Unlocked,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionLockTracker {
    state: SessionState,
}

impl SessionLockTracker {
    pub fn new(initial: SessionState) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Applies a notification. Returns `true` when the state changed.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        let next = event.target();
        tracing::info!(?event, session = %next, "session event");
        if self.state == next {
            return false;
        }
        self.state = next;
        true
    }
}
