//! Registry of connected companion devices and their latest telemetry

use coherence_shared::{defaults, now_ms};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Ephemeral identifier assigned to a connection when it is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    /// Generate a fresh, unique id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device state tracked by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub id: DeviceId,
    pub name: String,
    pub addr: SocketAddr,
    pub hrv: f64,
    pub heart_rate: f64,
    pub coherence: f64,
    pub connected_at_ms: u64,
}

impl ConnectedDevice {
    /// Record for a freshly ready connection, with placeholder telemetry
    pub fn new(id: DeviceId, addr: SocketAddr) -> Self {
        Self {
            id,
            name: defaults::PLACEHOLDER_DEVICE_NAME.to_string(),
            addr,
            hrv: 0.0,
            heart_rate: 0.0,
            coherence: 0.0,
            connected_at_ms: now_ms(),
        }
    }
}

/// All devices whose connection is currently ready
///
/// Owned by the hub actor; external readers receive cloned snapshots.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, ConnectedDevice>,
    /// Wall-clock time of the most recent health update, while its sender is connected
    last_sync_ms: Option<u64>,
    last_synced: Option<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device; returns false (and keeps the existing record) if the id is taken
    pub fn insert(&mut self, device: ConnectedDevice) -> bool {
        if self.devices.contains_key(&device.id) {
            return false;
        }
        self.devices.insert(device.id, device);
        true
    }

    /// Remove a device record
    pub fn remove(&mut self, id: &DeviceId) -> Option<ConnectedDevice> {
        if self.last_synced.as_ref() == Some(id) {
            self.last_synced = None;
            self.last_sync_ms = None;
        }
        self.devices.remove(id)
    }

    /// Remove every device, returning the removed ids
    pub fn clear(&mut self) -> Vec<DeviceId> {
        self.last_synced = None;
        self.last_sync_ms = None;
        self.devices.drain().map(|(id, _)| id).collect()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&ConnectedDevice> {
        self.devices.get(id)
    }

    /// Snapshot of all devices, oldest connection first
    pub fn list(&self) -> Vec<ConnectedDevice> {
        let mut devices: Vec<ConnectedDevice> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.connected_at_ms.cmp(&b.connected_at_ms).then(a.id.cmp(&b.id)));
        devices
    }

    /// Overwrite whichever telemetry fields are present and stamp the sync time
    pub fn apply_health(
        &mut self,
        id: &DeviceId,
        hrv: Option<f64>,
        heart_rate: Option<f64>,
        coherence: Option<f64>,
    ) -> Option<&ConnectedDevice> {
        let device = self.devices.get_mut(id)?;

        if let Some(hrv) = hrv {
            device.hrv = hrv;
        }
        if let Some(heart_rate) = heart_rate {
            device.heart_rate = heart_rate;
        }
        if let Some(coherence) = coherence {
            device.coherence = coherence;
        }

        self.last_sync_ms = Some(now_ms());
        self.last_synced = Some(*id);
        Some(device)
    }

    /// Set a device's display name
    pub fn rename(&mut self, id: &DeviceId, name: String) -> Option<&ConnectedDevice> {
        let device = self.devices.get_mut(id)?;
        device.name = name;
        Some(device)
    }

    /// Time of the last health update; `None` once that device is gone
    pub fn last_sync_ms(&self) -> Option<u64> {
        self.last_sync_ms
    }

    /// Device that sent the most recent health update, if still connected
    pub fn latest(&self) -> Option<&ConnectedDevice> {
        self.last_synced.as_ref().and_then(|id| self.devices.get(id))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
