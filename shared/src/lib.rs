//! Coherence Shared Protocol Types
//!
//! This crate provides the wire messages, codec and session state machine
//! shared between the coherence hub and its companion devices.

pub mod codec;
pub mod metrics;
pub mod protocol;
pub mod state_machine;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use codec::{CodecError, Framing, MessageDecoder};
pub use protocol::{CompanionMessage, ServiceAnnouncement};
pub use state_machine::{SessionEvent, SessionKind, SessionState, SessionStateMachine, TransitionResult};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol and session defaults shared by hub and companions
pub mod defaults {
    /// Advertised service type
    pub const SERVICE_TYPE: &str = "_coherence._tcp";

    /// Advertised service name
    pub const SERVICE_NAME: &str = "Coherence Hub";

    /// TCP port the hub accepts companion connections on
    pub const HUB_PORT: u16 = 7420;

    /// UDP port service announcements are broadcast to
    pub const DISCOVERY_PORT: u16 = 7421;

    /// Interval between service announcements
    pub const BEACON_INTERVAL_MS: u64 = 2000;

    /// Upper bound on a single read (and on a buffered frame)
    pub const MAX_CHUNK_LEN: usize = 64 * 1024;

    /// Default session target duration, in seconds
    pub const TARGET_DURATION_SECS: u64 = 600;

    /// Duration timer period
    pub const TICK_INTERVAL_MS: u64 = 1000;

    /// Display name given to a device before it sends `deviceInfo`
    pub const PLACEHOLDER_DEVICE_NAME: &str = "Unknown Device";
}
