//! Session State Machine
//!
//! Defines the valid biofeedback session transitions. Timing lives with the
//! hub's session coordinator; this type only decides where each event leads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the (single) session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Active => write!(f, "active"),
            SessionState::Paused => write!(f, "paused"),
        }
    }
}

/// What kind of session is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Solo,
    Group,
    Ambient,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Solo => write!(f, "solo"),
            SessionKind::Group => write!(f, "group"),
            SessionKind::Ambient => write!(f, "ambient"),
        }
    }
}

impl std::str::FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solo" => Ok(SessionKind::Solo),
            "group" => Ok(SessionKind::Group),
            "ambient" => Ok(SessionKind::Ambient),
            _ => Err(format!("Invalid session kind: {}", s)),
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Start (or restart) a session of the given kind
    Start(SessionKind),
    Pause,
    Resume,
    /// End the session, explicitly or because the target was reached
    End,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid; `from` is the state it left
    Success { from: SessionState, to: SessionState },
    /// Event does not apply in the current state; nothing changed
    Invalid { from: SessionState, event: SessionEvent },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success { .. })
    }
}

/// The session state machine
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current_state: SessionState,
    kind: SessionKind,
}

impl SessionStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Kind of the current (or most recent) session
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        let from = self.current_state;

        match self.get_next_state(&event) {
            Some(to) => {
                if let SessionEvent::Start(kind) = event {
                    self.kind = kind;
                }
                self.current_state = to;
                TransitionResult::Success { from, to }
            }
            None => TransitionResult::Invalid { from, event },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &SessionEvent) -> Option<SessionState> {
        use SessionEvent::*;
        use SessionState::*;

        match (self.current_state, event) {
            // Start and End apply from anywhere
            (_, Start(_)) => Some(Active),
            (_, End) => Some(Idle),

            (Active, Pause) => Some(Paused),
            (Paused, Resume) => Some(Active),

            _ => None,
        }
    }
}
