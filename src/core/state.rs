//! Session state machine
//!
//! Five states model the lifecycle of one debug session from the moment
//! `initialize` is sent until the debuggee (and the adapter's view of it)
//! is gone.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the active debug session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// `initialize` sent, awaiting the adapter's `initialized` event.
    Initializing,
    /// `initialized` received; breakpoints may be set, `run` starts execution.
    Configuring,
    /// Debuggee executing; console input suppressed unless a stop occurs.
    Running,
    /// At least one thread halted; console input enabled.
    Stopped,
    /// Debuggee gone.
    Terminated,
}

impl SessionState {
    /// Human-readable label used in `StateViolation` error messages.
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Terminated => "terminated",
        }
    }

    /// Whether console input should be accepted while in this state,
    /// ignoring the `readyForEvaluations` override for `Configuring`
    /// (that flag is tracked separately by the session core).
    pub fn accepts_input_unconditionally(self) -> bool {
        matches!(self, SessionState::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stopped_accepts_input_unconditionally() {
        assert!(SessionState::Stopped.accepts_input_unconditionally());
        assert!(!SessionState::Configuring.accepts_input_unconditionally());
        assert!(!SessionState::Running.accepts_input_unconditionally());
        assert!(!SessionState::Initializing.accepts_input_unconditionally());
        assert!(!SessionState::Terminated.accepts_input_unconditionally());
    }

    #[test]
    fn label_matches_display() {
        assert_eq!(SessionState::Running.to_string(), "running");
    }
}
