//! Biofeedback session coordination
//!
//! This module handles:
//! - The session lifecycle (idle, active, paused)
//! - Drift-free duration tracking and target auto-termination
//! - The participant roster and aggregate coherence

mod coordinator;
mod roster;
mod timer;

pub use coordinator::{SessionCoordinator, SessionSnapshot};
pub use roster::{Participant, ParticipantRoster};
pub use timer::{SessionTick, SessionTimer};
