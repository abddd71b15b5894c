//! Mailbox session lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the mailbox channel.
///
/// Starting a session while one is active replaces it: the old window is
/// deactivated, its queues are discarded and the detectors are retargeted
/// before the new window goes live. Ending a session is idempotent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No mailbox window is mapped; every access is a plain ROM read.
    #[default]
    Idle,
    /// A mailbox window is mapped and the detectors are armed.
    Active,
}

pub(crate) struct SessionController {
    state: AtomicU8,
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.state.load(Ordering::Acquire) == 0 {
            SessionState::Idle
        } else {
            SessionState::Active
        }
    }

    pub fn set_state(&self, state: SessionState) {
        let raw = match state {
            SessionState::Idle => 0,
            SessionState::Active => 1,
        };
        self.state.store(raw, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_and_tracks_transitions() {
        let ctl = SessionController::new();
        assert_eq!(ctl.state(), SessionState::Idle);
        ctl.set_state(SessionState::Active);
        assert_eq!(ctl.state(), SessionState::Active);
        ctl.set_state(SessionState::Idle);
        assert_eq!(ctl.state(), SessionState::Idle);
    }
}
