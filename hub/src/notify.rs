//! Change notifications for collaborators
//!
//! Anything that needs to react to registry or session changes subscribes
//! here instead of polling the hub.

use crate::registry::{ConnectedDevice, DeviceId};
use coherence_shared::{SessionKind, SessionState};
use std::time::Duration;
use tokio::sync::broadcast;

/// Default number of notifications buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Why a device left the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Transport reported an error
    Failed(String),
    /// Peer closed the connection or it was cancelled locally
    Cancelled,
}

/// Events emitted by the hub
#[derive(Debug, Clone, PartialEq)]
pub enum HubNotification {
    DiscoveryChanged { discovering: bool },
    DeviceConnected(ConnectedDevice),
    DeviceUpdated(ConnectedDevice),
    DeviceDisconnected { id: DeviceId, reason: DisconnectReason },
    SessionStateChanged {
        from: SessionState,
        to: SessionState,
        kind: SessionKind,
    },
    SessionTick { accrued: Duration, progress: f64 },
    /// Session ended on its own because the target duration was reached
    SessionCompleted { kind: SessionKind, duration: Duration },
    ParticipantsChanged { count: usize },
}

/// Fan-out sender; cheap to clone
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<HubNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a notification; dropped silently when nobody listens
    pub fn notify(&self, notification: HubNotification) {
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubNotification> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
