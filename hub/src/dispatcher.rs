//! Routes decoded companion messages to registry mutations

use crate::registry::{DeviceId, DeviceRegistry};
use coherence_shared::CompanionMessage;
use tracing::{debug, warn};

/// What a dispatched message did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Telemetry fields (and the sync time) were updated
    Updated,
    /// Display name was changed
    Renamed,
    /// Message carried nothing to apply
    Ignored,
    /// Sender has no registry record (not ready yet, or already torn down)
    UnknownDevice,
}

impl DispatchOutcome {
    /// Whether the sender's record changed
    pub fn mutated(self) -> bool {
        matches!(self, DispatchOutcome::Updated | DispatchOutcome::Renamed)
    }
}

/// Apply one message from `device_id` to the registry
pub fn dispatch(
    registry: &mut DeviceRegistry,
    device_id: &DeviceId,
    message: CompanionMessage,
) -> DispatchOutcome {
    match message {
        CompanionMessage::HealthUpdate {
            hrv,
            heart_rate,
            coherence,
        } => match registry.apply_health(device_id, hrv, heart_rate, coherence) {
            Some(device) => {
                debug!(
                    device = %device_id,
                    hrv = device.hrv,
                    heart_rate = device.heart_rate,
                    coherence = device.coherence,
                    "Health update"
                );
                DispatchOutcome::Updated
            }
            None => unknown_device(device_id, "healthUpdate"),
        },
        CompanionMessage::DeviceInfo { name: Some(name) } => {
            match registry.rename(device_id, name) {
                Some(device) => {
                    debug!(device = %device_id, name = %device.name, "Device info");
                    DispatchOutcome::Renamed
                }
                None => unknown_device(device_id, "deviceInfo"),
            }
        }
        CompanionMessage::DeviceInfo { name: None } => {
            debug!(device = %device_id, "deviceInfo without a name, ignoring");
            DispatchOutcome::Ignored
        }
        CompanionMessage::Unknown => {
            debug!(device = %device_id, "Unrecognized message type, ignoring");
            DispatchOutcome::Ignored
        }
    }
}

fn unknown_device(device_id: &DeviceId, kind: &str) -> DispatchOutcome {
    warn!(device = %device_id, kind, "Message for device with no registry record");
    DispatchOutcome::UnknownDevice
}
