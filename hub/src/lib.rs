//! Coherence hub
//!
//! Accepts companion devices over TCP, keeps their latest telemetry and runs
//! timed biofeedback sessions. All state lives on a single hub task; use
//! [`spawn`] to start one and the returned [`HubHandle`] to drive it.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod notify;
pub mod registry;
pub mod session;
pub mod transport;

pub use config::HubConfig;
pub use error::HubError;
pub use hub::{spawn, HubHandle, TelemetrySnapshot};
pub use notify::{DisconnectReason, HubNotification, Notifier};
pub use registry::{ConnectedDevice, DeviceId, DeviceRegistry};
pub use session::{Participant, ParticipantRoster, SessionCoordinator, SessionSnapshot};
