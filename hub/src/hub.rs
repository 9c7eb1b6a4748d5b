//! The hub actor
//!
//! One tokio task owns the listener, connection manager, device registry and
//! session coordinator. Public operations arrive as commands from a
//! [`HubHandle`]; accepted streams, connection events and timer ticks are
//! posted onto the same task. Nothing here takes a lock, because nothing
//! else ever touches this state.

use crate::config::HubConfig;
use crate::dispatcher::{dispatch, DispatchOutcome};
use crate::error::HubError;
use crate::notify::{DisconnectReason, HubNotification, Notifier, DEFAULT_CAPACITY};
use crate::registry::{ConnectedDevice, DeviceId, DeviceRegistry};
use crate::session::{Participant, SessionCoordinator, SessionSnapshot, SessionTick};
use crate::transport::{Accepted, ConnectionEvent, ConnectionManager, ConnectionState, Listener};
use bytes::Bytes;
use coherence_shared::{SessionKind, SessionState};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Latest telemetry for collaborators outside the process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub hrv: f64,
    pub coherence: f64,
    pub heart_rate: f64,
    pub phase: SessionState,
    /// When the telemetry was last synced; `None` before any health update
    /// and after the reporting device disconnects
    pub timestamp_ms: Option<u64>,
}

type Reply<T> = oneshot::Sender<T>;

enum HubCommand {
    StartDiscovery(Reply<Option<SocketAddr>>),
    StopDiscovery(Reply<()>),
    IsDiscovering(Reply<bool>),
    Devices(Reply<Vec<ConnectedDevice>>),
    Device(DeviceId, Reply<Option<ConnectedDevice>>),
    DisconnectAll(Reply<usize>),
    StartSession(SessionKind, Reply<()>),
    PauseSession(Reply<bool>),
    ResumeSession(Reply<bool>),
    EndSession(Reply<Duration>),
    SetTargetDuration(Duration, Reply<()>),
    AddParticipant(Participant, Reply<()>),
    RemoveParticipant(String, Reply<usize>),
    UpdateParticipant {
        id: String,
        hrv: f64,
        heart_rate: f64,
        coherence: f64,
        reply: Reply<bool>,
    },
    Participants(Reply<Vec<Participant>>),
    Session(Reply<SessionSnapshot>),
    Telemetry(Reply<TelemetrySnapshot>),
    Shutdown(Reply<()>),
}

/// Cloneable handle to a running hub
///
/// Every method is executed on the hub task, in the order calls are made
/// from a given handle.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    notifier: Notifier,
}

impl HubHandle {
    /// Subscribe to registry and session changes
    pub fn subscribe(&self) -> broadcast::Receiver<HubNotification> {
        self.notifier.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> HubCommand) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Start listening and advertising
    ///
    /// Returns the bound address, or `None` if binding failed. A second call
    /// while discovering returns the existing address without rebinding.
    pub async fn start_discovery(&self) -> Result<Option<SocketAddr>, HubError> {
        self.request(HubCommand::StartDiscovery).await
    }

    pub async fn stop_discovery(&self) -> Result<(), HubError> {
        self.request(HubCommand::StopDiscovery).await
    }

    pub async fn is_discovering(&self) -> Result<bool, HubError> {
        self.request(HubCommand::IsDiscovering).await
    }

    /// Snapshot of all connected devices
    pub async fn devices(&self) -> Result<Vec<ConnectedDevice>, HubError> {
        self.request(HubCommand::Devices).await
    }

    pub async fn device(&self, id: DeviceId) -> Result<Option<ConnectedDevice>, HubError> {
        self.request(|reply| HubCommand::Device(id, reply)).await
    }

    /// Cancel every connection and clear the registry; returns how many were open
    pub async fn disconnect_all(&self) -> Result<usize, HubError> {
        self.request(HubCommand::DisconnectAll).await
    }

    pub async fn start_session(&self, kind: SessionKind) -> Result<(), HubError> {
        self.request(|reply| HubCommand::StartSession(kind, reply)).await
    }

    /// Returns whether the session was active and is now paused
    pub async fn pause_session(&self) -> Result<bool, HubError> {
        self.request(HubCommand::PauseSession).await
    }

    /// Returns whether the session was paused and is now active
    pub async fn resume_session(&self) -> Result<bool, HubError> {
        self.request(HubCommand::ResumeSession).await
    }

    /// Returns the final duration of the ended session
    pub async fn end_session(&self) -> Result<Duration, HubError> {
        self.request(HubCommand::EndSession).await
    }

    pub async fn set_target_duration(&self, target: Duration) -> Result<(), HubError> {
        self.request(|reply| HubCommand::SetTargetDuration(target, reply)).await
    }

    pub async fn add_participant(&self, participant: Participant) -> Result<(), HubError> {
        self.request(|reply| HubCommand::AddParticipant(participant, reply)).await
    }

    /// Returns how many entries were removed
    pub async fn remove_participant(&self, id: impl Into<String>) -> Result<usize, HubError> {
        let id = id.into();
        self.request(|reply| HubCommand::RemoveParticipant(id, reply)).await
    }

    /// Returns whether a participant with this id existed
    pub async fn update_participant(
        &self,
        id: impl Into<String>,
        hrv: f64,
        heart_rate: f64,
        coherence: f64,
    ) -> Result<bool, HubError> {
        let id = id.into();
        self.request(|reply| HubCommand::UpdateParticipant {
            id,
            hrv,
            heart_rate,
            coherence,
            reply,
        })
        .await
    }

    pub async fn participants(&self) -> Result<Vec<Participant>, HubError> {
        self.request(HubCommand::Participants).await
    }

    pub async fn session(&self) -> Result<SessionSnapshot, HubError> {
        self.request(HubCommand::Session).await
    }

    pub async fn telemetry(&self) -> Result<TelemetrySnapshot, HubError> {
        self.request(HubCommand::Telemetry).await
    }

    /// Stop discovery, disconnect everything, end the session, stop the hub
    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.request(HubCommand::Shutdown).await
    }
}

/// Spawn the hub actor on the current runtime
pub fn spawn(config: HubConfig) -> HubHandle {
    let capacity = config.channel_capacity.max(1);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (accept_tx, accept_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (tick_tx, tick_rx) = mpsc::channel(capacity);
    let notifier = Notifier::new(DEFAULT_CAPACITY);

    let state = HubState::new(config, accept_tx, event_tx, tick_tx, notifier.clone());
    tokio::spawn(state.run(command_rx, accept_rx, event_rx, tick_rx));

    HubHandle {
        commands: command_tx,
        notifier,
    }
}

/// Everything the hub task owns
struct HubState {
    config: HubConfig,
    listener: Listener,
    connections: ConnectionManager,
    registry: DeviceRegistry,
    coordinator: SessionCoordinator,
    notifier: Notifier,
}

enum Flow {
    Continue,
    Stop,
}

impl HubState {
    fn new(
        config: HubConfig,
        accepted: mpsc::Sender<Accepted>,
        events: mpsc::Sender<ConnectionEvent>,
        ticks: mpsc::Sender<SessionTick>,
        notifier: Notifier,
    ) -> Self {
        let connections = ConnectionManager::new(events, config.framing, config.max_chunk_len);
        let coordinator = SessionCoordinator::new(
            config.target_duration,
            config.tick_interval,
            ticks,
            notifier.clone(),
        );

        Self {
            listener: Listener::new(accepted),
            connections,
            registry: DeviceRegistry::new(),
            coordinator,
            notifier,
            config,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<HubCommand>,
        mut accepted: mpsc::Receiver<Accepted>,
        mut events: mpsc::Receiver<ConnectionEvent>,
        mut ticks: mpsc::Receiver<SessionTick>,
    ) {
        info!("Hub started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Flow::Stop = self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        // Every handle is gone
                        self.shutdown();
                        break;
                    }
                },
                Some(Accepted { stream, addr }) = accepted.recv() => {
                    self.connections.accept(stream, addr);
                }
                Some(event) = events.recv() => self.handle_connection_event(event),
                Some(tick) = ticks.recv() => {
                    self.coordinator.on_tick(tick);
                }
            }
        }

        info!("Hub stopped");
    }

    async fn handle_command(&mut self, command: HubCommand) -> Flow {
        match command {
            HubCommand::StartDiscovery(reply) => {
                let addr = self.start_discovery().await;
                let _ = reply.send(addr);
            }
            HubCommand::StopDiscovery(reply) => {
                self.stop_discovery();
                let _ = reply.send(());
            }
            HubCommand::IsDiscovering(reply) => {
                let _ = reply.send(self.listener.is_discovering());
            }
            HubCommand::Devices(reply) => {
                let _ = reply.send(self.registry.list());
            }
            HubCommand::Device(id, reply) => {
                let _ = reply.send(self.registry.get(&id).cloned());
            }
            HubCommand::DisconnectAll(reply) => {
                let _ = reply.send(self.disconnect_all());
            }
            HubCommand::StartSession(kind, reply) => {
                self.coordinator.start_session(kind);
                let _ = reply.send(());
            }
            HubCommand::PauseSession(reply) => {
                let _ = reply.send(self.coordinator.pause_session());
            }
            HubCommand::ResumeSession(reply) => {
                let _ = reply.send(self.coordinator.resume_session());
            }
            HubCommand::EndSession(reply) => {
                let _ = reply.send(self.coordinator.end_session());
            }
            HubCommand::SetTargetDuration(target, reply) => {
                self.coordinator.set_target_duration(target);
                let _ = reply.send(());
            }
            HubCommand::AddParticipant(participant, reply) => {
                self.coordinator.add_participant(participant);
                let _ = reply.send(());
            }
            HubCommand::RemoveParticipant(id, reply) => {
                let _ = reply.send(self.coordinator.remove_participant(&id));
            }
            HubCommand::UpdateParticipant {
                id,
                hrv,
                heart_rate,
                coherence,
                reply,
            } => {
                let updated = self
                    .coordinator
                    .update_participant(&id, hrv, heart_rate, coherence);
                let _ = reply.send(updated);
            }
            HubCommand::Participants(reply) => {
                let _ = reply.send(self.coordinator.roster().to_vec());
            }
            HubCommand::Session(reply) => {
                let _ = reply.send(self.coordinator.snapshot());
            }
            HubCommand::Telemetry(reply) => {
                let _ = reply.send(self.telemetry());
            }
            HubCommand::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn start_discovery(&mut self) -> Option<SocketAddr> {
        if self.listener.is_discovering() {
            debug!("Discovery already running");
            return self.listener.local_addr();
        }

        if self.listener.start(&self.config).await {
            self.notifier
                .notify(HubNotification::DiscoveryChanged { discovering: true });
        }
        self.listener.local_addr()
    }

    fn stop_discovery(&mut self) {
        if self.listener.stop() {
            self.notifier
                .notify(HubNotification::DiscoveryChanged { discovering: false });
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged { id, state } if state.is_terminal() => {
                self.teardown(id, state)
            }
            ConnectionEvent::StateChanged { id, state } => {
                if state == ConnectionState::Ready {
                    self.on_ready(id);
                }
            }
            ConnectionEvent::Received { id, chunk } => self.on_received(id, chunk),
        }
    }

    fn on_ready(&mut self, id: DeviceId) {
        let Some(addr) = self.connections.mark_ready(&id) else {
            debug!(device = %id, "Ready for unknown or already ready connection");
            return;
        };

        let device = ConnectedDevice::new(id, addr);
        if self.registry.insert(device.clone()) {
            info!(device = %id, %addr, "Device connected");
            self.notifier.notify(HubNotification::DeviceConnected(device));
        }
    }

    fn on_received(&mut self, id: DeviceId, chunk: Bytes) {
        let Some(results) = self.connections.decode(&id, &chunk) else {
            debug!(device = %id, "Dropping data from closed connection");
            return;
        };

        for result in results {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    warn!(device = %id, "Dropping message: {}", e);
                    continue;
                }
            };

            let kind = message.kind();
            let outcome = dispatch(&mut self.registry, &id, message);
            if outcome.mutated() {
                if let Some(device) = self.registry.get(&id) {
                    self.notifier
                        .notify(HubNotification::DeviceUpdated(device.clone()));
                }
            } else if outcome == DispatchOutcome::Ignored {
                debug!(device = %id, kind, "Message ignored");
            }
        }
    }

    /// Remove a connection and its device record; repeated signals are no-ops
    fn teardown(&mut self, id: DeviceId, state: ConnectionState) {
        if self.connections.teardown(&id, state.clone()).is_none() {
            debug!(device = %id, "Connection already torn down");
            return;
        }

        let reason = match state {
            ConnectionState::Failed(reason) => {
                warn!(device = %id, "Connection failed: {}", reason);
                DisconnectReason::Failed(reason)
            }
            _ => {
                info!(device = %id, "Connection closed");
                DisconnectReason::Cancelled
            }
        };

        if self.registry.remove(&id).is_some() {
            self.notifier
                .notify(HubNotification::DeviceDisconnected { id, reason });
        }
    }

    fn disconnect_all(&mut self) -> usize {
        let cancelled = self.connections.cancel_all();
        let removed = self.registry.clear();

        for id in removed {
            self.notifier.notify(HubNotification::DeviceDisconnected {
                id,
                reason: DisconnectReason::Cancelled,
            });
        }

        if !cancelled.is_empty() {
            info!("Disconnected {} companion(s)", cancelled.len());
        }
        cancelled.len()
    }

    fn telemetry(&self) -> TelemetrySnapshot {
        let latest = self.registry.latest();
        TelemetrySnapshot {
            hrv: latest.map_or(0.0, |d| d.hrv),
            coherence: latest.map_or(0.0, |d| d.coherence),
            heart_rate: latest.map_or(0.0, |d| d.heart_rate),
            phase: self.coordinator.state(),
            timestamp_ms: self.registry.last_sync_ms(),
        }
    }

    fn shutdown(&mut self) {
        self.stop_discovery();
        self.disconnect_all();
        if self.coordinator.state() != SessionState::Idle {
            self.coordinator.end_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    fn test_config() -> HubConfig {
        HubConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            beacon_addr: None,
            ..Default::default()
        }
    }

    /// Hub state plus the receivers its tasks post to
    struct Harness {
        state: HubState,
        events: mpsc::Receiver<ConnectionEvent>,
        notifications: broadcast::Receiver<HubNotification>,
        _accepted: mpsc::Receiver<Accepted>,
        _ticks: mpsc::Receiver<SessionTick>,
    }

    fn harness() -> Harness {
        let (accept_tx, accept_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let (tick_tx, tick_rx) = mpsc::channel(16);
        let notifier = Notifier::new(64);
        let notifications = notifier.subscribe();

        Harness {
            state: HubState::new(test_config(), accept_tx, event_tx, tick_tx, notifier),
            events: event_rx,
            notifications,
            _accepted: accept_rx,
            _ticks: tick_rx,
        }
    }

    /// Accept a loopback connection into the hub and bring it to ready
    async fn connect_device(h: &mut Harness) -> (DeviceId, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, addr) = listener.accept().await.unwrap();

        let id = h.state.connections.accept(stream, addr);
        let ready = h.events.recv().await.unwrap();
        h.state.handle_connection_event(ready);
        (id, client)
    }

    fn received(id: DeviceId, json: &str) -> ConnectionEvent {
        ConnectionEvent::Received {
            id,
            chunk: Bytes::copy_from_slice(json.as_bytes()),
        }
    }

    async fn next_matching<F>(rx: &mut broadcast::Receiver<HubNotification>, f: F) -> HubNotification
    where
        F: Fn(&HubNotification) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                let n = rx.recv().await.unwrap();
                if f(&n) {
                    return n;
                }
            }
        })
        .await
        .expect("notification not received in time")
    }

    #[tokio::test]
    async fn test_ready_creates_placeholder_device() {
        let mut h = harness();
        let (id, _client) = connect_device(&mut h).await;

        let device = h.state.registry.get(&id).unwrap();
        assert_eq!(device.name, coherence_shared::defaults::PLACEHOLDER_DEVICE_NAME);
        assert_eq!(device.hrv, 0.0);
        assert_eq!(h.state.connections.state(&id), Some(&ConnectionState::Ready));
    }

    #[tokio::test]
    async fn test_partial_health_update_via_hub() {
        let mut h = harness();
        let (id, _client) = connect_device(&mut h).await;

        h.state
            .handle_connection_event(received(id, r#"{"type":"healthUpdate","heartRate":64,"coherence":30}"#));
        h.state
            .handle_connection_event(received(id, r#"{"type":"healthUpdate","hrv":65.2}"#));

        let device = h.state.registry.get(&id).unwrap();
        assert_eq!(device.hrv, 65.2);
        assert_eq!(device.heart_rate, 64.0);
        assert_eq!(device.coherence, 30.0);
    }

    #[tokio::test]
    async fn test_unknown_and_untyped_messages_mutate_nothing() {
        let mut h = harness();
        let (id, _client) = connect_device(&mut h).await;
        let before = h.state.registry.list();

        h.state.handle_connection_event(received(id, r#"{"type":"unknown"}"#));
        h.state.handle_connection_event(received(id, r#"{"hrv":99}"#));
        h.state.handle_connection_event(received(id, "not json"));

        assert_eq!(h.state.registry.list(), before);
        assert_eq!(h.state.registry.last_sync_ms(), None);
        // Connection survives protocol errors
        assert!(h.state.connections.contains(&id));
    }

    #[tokio::test]
    async fn test_failed_teardown_is_idempotent() {
        let mut h = harness();
        let (id, _client) = connect_device(&mut h).await;
        let (other, _other_client) = connect_device(&mut h).await;

        let failed = || ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Failed("reset by peer".into()),
        };

        h.state.handle_connection_event(failed());
        assert!(h.state.registry.get(&id).is_none());
        assert!(!h.state.connections.contains(&id));
        let after_first = h.state.registry.list();

        h.state.handle_connection_event(failed());
        assert_eq!(h.state.registry.list(), after_first);
        assert!(h.state.registry.get(&other).is_some());

        let mut disconnects = 0;
        while let Ok(n) = h.notifications.try_recv() {
            if matches!(n, HubNotification::DeviceDisconnected { .. }) {
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_teardown_keeps_participants() {
        let mut h = harness();
        let (id, _client) = connect_device(&mut h).await;
        h.state
            .coordinator
            .add_participant(Participant::new("p1", "Ann").with_device(id.to_string()));

        h.state.handle_connection_event(ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Cancelled,
        });

        assert!(h.state.registry.is_empty());
        assert_eq!(h.state.coordinator.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_late_events_after_disconnect_all() {
        let mut h = harness();
        let (id, _client) = connect_device(&mut h).await;

        assert_eq!(h.state.disconnect_all(), 1);
        assert!(h.state.registry.is_empty());

        h.state
            .handle_connection_event(received(id, r#"{"type":"deviceInfo","name":"Ghost"}"#));
        h.state.handle_connection_event(ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Ready,
        });
        assert!(h.state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_telemetry_snapshot() {
        let mut h = harness();
        let snapshot = h.state.telemetry();
        assert_eq!(snapshot.timestamp_ms, None);
        assert_eq!(snapshot.phase, SessionState::Idle);

        let (id, _client) = connect_device(&mut h).await;
        h.state.handle_connection_event(received(
            id,
            r#"{"type":"healthUpdate","hrv":48,"heartRate":66,"coherence":71}"#,
        ));
        h.state.coordinator.start_session(SessionKind::Solo);

        let snapshot = h.state.telemetry();
        assert_eq!(snapshot.hrv, 48.0);
        assert_eq!(snapshot.heart_rate, 66.0);
        assert_eq!(snapshot.coherence, 71.0);
        assert_eq!(snapshot.phase, SessionState::Active);
        assert!(snapshot.timestamp_ms.is_some());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"], "active");
        assert_eq!(json["heart_rate"], 66.0);

        // Telemetry of a departed device is not reported as current
        h.state.handle_connection_event(ConnectionEvent::StateChanged {
            id,
            state: ConnectionState::Cancelled,
        });
        let snapshot = h.state.telemetry();
        assert_eq!(snapshot.timestamp_ms, None);
        assert_eq!(snapshot.hrv, 0.0);
    }

    #[tokio::test]
    async fn test_discovery_start_twice_sets_up_once() {
        let hub = spawn(test_config());
        let mut rx = hub.subscribe();

        let first = hub.start_discovery().await.unwrap();
        let second = hub.start_discovery().await.unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(hub.is_discovering().await.unwrap());

        hub.stop_discovery().await.unwrap();
        hub.stop_discovery().await.unwrap();
        assert!(!hub.is_discovering().await.unwrap());

        let mut changes = Vec::new();
        while let Ok(n) = rx.try_recv() {
            if let HubNotification::DiscoveryChanged { discovering } = n {
                changes.push(discovering);
            }
        }
        assert_eq!(changes, vec![true, false]);
    }

    #[tokio::test]
    async fn test_bind_failure_is_not_fatal() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let hub = spawn(HubConfig {
            bind_addr: occupied.local_addr().unwrap(),
            beacon_addr: None,
            ..Default::default()
        });

        assert_eq!(hub.start_discovery().await.unwrap(), None);
        assert!(!hub.is_discovering().await.unwrap());
    }

    #[tokio::test]
    async fn test_end_to_end_over_tcp() {
        let hub = spawn(test_config());
        let mut rx = hub.subscribe();
        let addr = hub.start_discovery().await.unwrap().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let connected = next_matching(&mut rx, |n| matches!(n, HubNotification::DeviceConnected(_))).await;
        let HubNotification::DeviceConnected(device) = connected else {
            unreachable!()
        };

        client
            .write_all(br#"{"type":"deviceInfo","name":"Chest Strap"}"#)
            .await
            .unwrap();
        next_matching(&mut rx, |n| {
            matches!(n, HubNotification::DeviceUpdated(d) if d.name == "Chest Strap")
        })
        .await;

        let stored = hub.device(device.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Chest Strap");
        assert_eq!(hub.devices().await.unwrap().len(), 1);

        drop(client);
        next_matching(&mut rx, |n| matches!(n, HubNotification::DeviceDisconnected { .. })).await;
        assert!(hub.devices().await.unwrap().is_empty());

        hub.shutdown().await.unwrap();
        assert_eq!(hub.is_discovering().await, Err(HubError::Closed));
    }

    #[tokio::test]
    async fn test_session_operations_via_handle() {
        let hub = spawn(test_config());

        hub.add_participant(Participant::new("a", "Ann").with_telemetry(0.0, 0.0, 80.0))
            .await
            .unwrap();
        hub.add_participant(Participant::new("b", "Ben").with_telemetry(0.0, 0.0, 60.0))
            .await
            .unwrap();

        assert!(!hub.pause_session().await.unwrap());
        hub.start_session(SessionKind::Group).await.unwrap();
        assert!(hub.pause_session().await.unwrap());
        assert!(hub.resume_session().await.unwrap());

        let session = hub.session().await.unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.kind, SessionKind::Group);
        assert_eq!(session.average_coherence, 70.0);
        assert_eq!(session.participant_count, 2);

        assert!(hub.update_participant("b", 1.0, 2.0, 100.0).await.unwrap());
        assert_eq!(hub.remove_participant("a").await.unwrap(), 1);
        assert_eq!(hub.participants().await.unwrap()[0].coherence, 100.0);

        hub.end_session().await.unwrap();
        assert_eq!(hub.session().await.unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_zero_tick_interval_still_auto_terminates() {
        let hub = spawn(HubConfig {
            tick_interval: Duration::ZERO,
            target_duration: Duration::from_millis(50),
            ..test_config()
        });
        let mut rx = hub.subscribe();

        hub.start_session(SessionKind::Solo).await.unwrap();
        next_matching(&mut rx, |n| matches!(n, HubNotification::SessionCompleted { .. })).await;
        assert_eq!(hub.session().await.unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_auto_termination_via_timer() {
        let hub = spawn(HubConfig {
            tick_interval: Duration::from_millis(10),
            target_duration: Duration::from_millis(30),
            ..test_config()
        });
        let mut rx = hub.subscribe();

        hub.start_session(SessionKind::Solo).await.unwrap();
        next_matching(&mut rx, |n| matches!(n, HubNotification::SessionCompleted { .. })).await;

        let session = hub.session().await.unwrap();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.accrued, Duration::ZERO);
    }
}
