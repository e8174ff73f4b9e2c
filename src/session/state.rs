//! Content session state machine.
//!
//! # State Transitions
//! ```text
//! HANDLING --begin_activation--> STARTING --resolve: Proceed--> ACTIVE
//! HANDLING/STARTING/ACTIVE --terminate--> TERMINATED
//! STARTING --resolve: AlreadyTerminated--> (teardown only, already TERMINATED)
//! ```
//!
//! The machine itself holds no lock. It lives inside the session mutex and
//! every method is a plain compare-and-set on owned memory, so the caller's
//! critical section never touches I/O.

use std::fmt;

use crate::error::ContentError;

/// Lifecycle state of a content session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Request accepted, media not yet requested.
    Handling,
    /// Backend endpoints are being built.
    Starting,
    /// Client answered, media may flow.
    Active,
    /// Terminal.
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Handling => "HANDLING",
            SessionState::Starting => "STARTING",
            SessionState::Active => "ACTIVE",
            SessionState::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the activation path may do once backend construction returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Session moved to ACTIVE; answer the client.
    Proceed,
    /// Session was terminated while endpoints were being built; tear down silently.
    AlreadyTerminated,
}

/// Authoritative session state with the legal transitions.
#[derive(Debug)]
pub struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Handling,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// HANDLING → STARTING. Any other state is a lifecycle violation and
    /// leaves the state untouched.
    pub fn try_begin_activation(&mut self) -> Result<(), ContentError> {
        if self.state != SessionState::Handling {
            return Err(ContentError::InvalidLifecycleTransition { state: self.state });
        }
        self.state = SessionState::Starting;
        Ok(())
    }

    /// STARTING → ACTIVE, unless termination got there first.
    pub fn resolve_after_activation(&mut self) -> Result<Resolution, ContentError> {
        match self.state {
            SessionState::Terminated => Ok(Resolution::AlreadyTerminated),
            SessionState::Starting => {
                self.state = SessionState::Active;
                Ok(Resolution::Proceed)
            }
            state => Err(ContentError::InvalidLifecycleTransition { state }),
        }
    }

    /// Move to TERMINATED. Returns true only for the call that performed the
    /// transition; later calls are no-ops.
    pub fn terminate(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Terminated;
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_active() {
        let mut machine = StateMachine::new();
        assert_eq!(machine.state(), SessionState::Handling);

        machine.try_begin_activation().unwrap();
        assert_eq!(machine.state(), SessionState::Starting);

        assert_eq!(machine.resolve_after_activation().unwrap(), Resolution::Proceed);
        assert_eq!(machine.state(), SessionState::Active);
    }

    #[test]
    fn second_activation_is_rejected_without_mutation() {
        let mut machine = StateMachine::new();
        machine.try_begin_activation().unwrap();

        let err = machine.try_begin_activation().unwrap_err();
        assert!(matches!(
            err,
            ContentError::InvalidLifecycleTransition { state: SessionState::Starting }
        ));
        assert_eq!(machine.state(), SessionState::Starting);
    }

    #[test]
    fn termination_during_starting_is_observed() {
        let mut machine = StateMachine::new();
        machine.try_begin_activation().unwrap();
        assert!(machine.terminate());

        assert_eq!(
            machine.resolve_after_activation().unwrap(),
            Resolution::AlreadyTerminated
        );
        assert_eq!(machine.state(), SessionState::Terminated);
    }

    #[test]
    fn terminate_is_first_caller_wins() {
        for setup in [0, 1, 2] {
            let mut machine = StateMachine::new();
            if setup >= 1 {
                machine.try_begin_activation().unwrap();
            }
            if setup >= 2 {
                machine.resolve_after_activation().unwrap();
            }
            assert!(machine.terminate());
            assert!(!machine.terminate());
            assert!(!machine.terminate());
            assert_eq!(machine.state(), SessionState::Terminated);
        }
    }

    #[test]
    fn activation_after_terminate_is_rejected() {
        let mut machine = StateMachine::new();
        machine.terminate();
        assert!(machine.try_begin_activation().is_err());
        assert_eq!(machine.state(), SessionState::Terminated);
    }

    #[test]
    fn resolve_outside_starting_is_a_violation() {
        let mut machine = StateMachine::new();
        assert!(machine.resolve_after_activation().is_err());
        assert_eq!(machine.state(), SessionState::Handling);
    }
}
