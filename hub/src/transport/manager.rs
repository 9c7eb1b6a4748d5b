//! Connection manager for tracking all open companion connections

use super::connection::{run_receive_loop, ConnectionEvent, ConnectionState, DeviceConnection};
use crate::registry::DeviceId;
use coherence_shared::{CodecError, CompanionMessage, Framing, MessageDecoder};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Manages all open companion connections
///
/// Owned by the hub actor. Receive loops run as separate tasks and report
/// back through the event channel handed to [`ConnectionManager::new`].
pub struct ConnectionManager {
    /// Map of device id -> connection
    connections: HashMap<DeviceId, DeviceConnection>,
    events: mpsc::Sender<ConnectionEvent>,
    framing: Framing,
    max_chunk_len: usize,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(events: mpsc::Sender<ConnectionEvent>, framing: Framing, max_chunk_len: usize) -> Self {
        Self {
            connections: HashMap::new(),
            events,
            framing,
            max_chunk_len,
        }
    }

    /// Take ownership of an accepted stream
    ///
    /// Assigns a fresh id and starts the receive loop right away.
    pub fn accept(&mut self, stream: TcpStream, addr: SocketAddr) -> DeviceId {
        let mut id = DeviceId::new();
        while self.connections.contains_key(&id) {
            id = DeviceId::new();
        }

        let task = tokio::spawn(run_receive_loop(
            id,
            stream,
            self.max_chunk_len,
            self.events.clone(),
        ));
        let decoder = MessageDecoder::new(self.framing, self.max_chunk_len);

        self.connections
            .insert(id, DeviceConnection::new(id, addr, decoder, task));
        info!(device = %id, %addr, "Accepted companion connection");
        id
    }

    /// Move a connecting connection to ready
    ///
    /// Returns the peer address on the first transition only.
    pub fn mark_ready(&mut self, id: &DeviceId) -> Option<SocketAddr> {
        let conn = self.connections.get_mut(id)?;
        if conn.state != ConnectionState::Connecting {
            return None;
        }
        conn.state = ConnectionState::Ready;
        Some(conn.addr)
    }

    /// Remove a connection that reached a terminal state
    ///
    /// Idempotent: `None` if the id was already torn down.
    pub fn teardown(&mut self, id: &DeviceId, state: ConnectionState) -> Option<DeviceConnection> {
        let mut conn = self.connections.remove(id)?;
        conn.cancel();
        debug!(
            device = %id,
            ?state,
            uptime = ?conn.accepted_at.elapsed(),
            "Connection torn down"
        );
        conn.state = state;
        Some(conn)
    }

    /// Feed a received chunk to the connection's decoder
    ///
    /// `None` if the connection is gone (late event from a cancelled loop).
    pub fn decode(
        &mut self,
        id: &DeviceId,
        chunk: &[u8],
    ) -> Option<Vec<Result<CompanionMessage, CodecError>>> {
        let conn = self.connections.get_mut(id)?;
        conn.decoder.extend(chunk);

        let mut results = Vec::new();
        while let Some(result) = conn.decoder.decode_next() {
            results.push(result);
        }
        Some(results)
    }

    /// Cancel every open connection, returning their ids
    pub fn cancel_all(&mut self) -> Vec<DeviceId> {
        self.connections
            .drain()
            .map(|(id, conn)| {
                conn.cancel();
                id
            })
            .collect()
    }

    pub fn state(&self, id: &DeviceId) -> Option<&ConnectionState> {
        self.connections.get(id).map(|c| &c.state)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.connections.contains_key(id)
    }

    /// Get the number of open connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn accepted_stream() -> (TcpStream, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, addr) = listener.accept().await.unwrap();
        (server, addr, client)
    }

    #[tokio::test]
    async fn test_accept_mark_ready_teardown() {
        let (tx, _rx) = mpsc::channel(16);
        let mut manager = ConnectionManager::new(tx, Framing::PerRead, 1024);
        let (stream, addr, _client) = accepted_stream().await;

        let id = manager.accept(stream, addr);
        assert_eq!(manager.state(&id), Some(&ConnectionState::Connecting));

        assert_eq!(manager.mark_ready(&id), Some(addr));
        assert_eq!(manager.mark_ready(&id), None);

        let conn = manager.teardown(&id, ConnectionState::Failed("boom".into()));
        assert_eq!(conn.map(|c| c.state), Some(ConnectionState::Failed("boom".into())));
        assert!(manager.teardown(&id, ConnectionState::Failed("boom".into())).is_none());
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_decode_uses_per_connection_framing() {
        let (tx, _rx) = mpsc::channel(16);
        let mut manager = ConnectionManager::new(tx, Framing::NewlineDelimited, 1024);
        let (stream, addr, _client) = accepted_stream().await;
        let id = manager.accept(stream, addr);

        let results = manager.decode(&id, b"{\"type\":\"deviceInfo\",\"name\":\"A\"}\n{\"ty").unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());

        let results = manager.decode(&id, b"pe\":\"deviceInfo\"}\n").unwrap();
        assert_eq!(results.len(), 1);

        assert!(manager.decode(&DeviceId::new(), b"{}").is_none());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let (tx, _rx) = mpsc::channel(16);
        let mut manager = ConnectionManager::new(tx, Framing::PerRead, 1024);
        let (s1, a1, _c1) = accepted_stream().await;
        let (s2, a2, _c2) = accepted_stream().await;
        let id1 = manager.accept(s1, a1);
        let id2 = manager.accept(s2, a2);

        let mut ids = manager.cancel_all();
        ids.sort();
        let mut expected = vec![id1, id2];
        expected.sort();

        assert_eq!(ids, expected);
        assert_eq!(manager.count(), 0);
        assert!(!manager.contains(&id1));
    }
}
