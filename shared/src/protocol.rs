//! Wire messages exchanged on the local network
//!
//! Companions send JSON objects tagged by a `type` field:
//! ```text
//! { "type": "healthUpdate", "hrv": 65.2, "heartRate": 61, "coherence": 72.5 }
//! { "type": "deviceInfo", "name": "Apple Watch" }
//! ```
//! The protocol is unidirectional (companion -> hub). The hub additionally
//! broadcasts a [`ServiceAnnouncement`] datagram so companions can find it.

use serde::{Deserialize, Serialize};

/// A single hub-bound message from a companion device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompanionMessage {
    /// Fresh telemetry; each present field overwrites the stored value
    HealthUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hrv: Option<f64>,
        #[serde(default, rename = "heartRate", skip_serializing_if = "Option::is_none")]
        heart_rate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coherence: Option<f64>,
    },
    /// Device identity details
    DeviceInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Any tag value the hub does not understand
    #[serde(other)]
    Unknown,
}

impl CompanionMessage {
    /// Build a health update carrying all three telemetry scalars
    pub fn health(hrv: f64, heart_rate: f64, coherence: f64) -> Self {
        Self::HealthUpdate {
            hrv: Some(hrv),
            heart_rate: Some(heart_rate),
            coherence: Some(coherence),
        }
    }

    /// Build a device info message
    pub fn device_info(name: impl Into<String>) -> Self {
        Self::DeviceInfo {
            name: Some(name.into()),
        }
    }

    /// Wire tag of this message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HealthUpdate { .. } => "healthUpdate",
            Self::DeviceInfo { .. } => "deviceInfo",
            Self::Unknown => "unknown",
        }
    }
}

/// Datagram broadcast by the hub while it is discovering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAnnouncement {
    /// Service type, e.g. `_coherence._tcp`
    pub service: String,
    /// Human readable hub name
    pub name: String,
    /// TCP port companions should connect to
    pub port: u16,
}

impl ServiceAnnouncement {
    pub fn new(service: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            name: name.into(),
            port,
        }
    }

    /// Serialize into a datagram payload
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a datagram payload; `None` for anything that is not an announcement
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        serde_json::from_slice(buf).ok()
    }
}
