//! Individual companion connection handling

use crate::registry::DeviceId;
use bytes::Bytes;
use coherence_shared::MessageDecoder;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Lifecycle of a companion connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Failed(String),
    Cancelled,
}

impl ConnectionState {
    /// Failed and Cancelled are terminal; the connection is torn down
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed(_) | ConnectionState::Cancelled)
    }
}

/// Events posted by a receive loop back to the hub
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged { id: DeviceId, state: ConnectionState },
    /// One non-empty read from the transport
    Received { id: DeviceId, chunk: Bytes },
}

/// A live connection as tracked by the connection manager
#[derive(Debug)]
pub struct DeviceConnection {
    pub id: DeviceId,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    pub accepted_at: Instant,
    pub(crate) decoder: MessageDecoder,
    task: JoinHandle<()>,
}

impl DeviceConnection {
    pub(crate) fn new(
        id: DeviceId,
        addr: SocketAddr,
        decoder: MessageDecoder,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            addr,
            state: ConnectionState::Connecting,
            accepted_at: Instant::now(),
            decoder,
            task,
        }
    }

    /// Stop the receive loop; no further events are produced for this id
    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Start a connection and run its receive loop until the transport ends
///
/// Posts `Ready` before the first read so no early data is lost, then one
/// `Received` per non-empty read. Exactly one terminal state is posted.
pub(crate) async fn run_receive_loop(
    id: DeviceId,
    stream: TcpStream,
    max_chunk_len: usize,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let terminal = receive(id, stream, max_chunk_len, &events).await;
    let _ = events
        .send(ConnectionEvent::StateChanged { id, state: terminal })
        .await;
}

async fn receive(
    id: DeviceId,
    mut stream: TcpStream,
    max_chunk_len: usize,
    events: &mpsc::Sender<ConnectionEvent>,
) -> ConnectionState {
    if let Err(e) = stream.set_nodelay(true) {
        return ConnectionState::Failed(format!("Failed to start connection: {}", e));
    }

    let ready = ConnectionEvent::StateChanged {
        id,
        state: ConnectionState::Ready,
    };
    if events.send(ready).await.is_err() {
        return ConnectionState::Cancelled;
    }

    let mut read_buf = vec![0u8; max_chunk_len.max(1)];

    loop {
        match stream.read(&mut read_buf).await {
            Ok(0) => {
                debug!(device = %id, "Peer closed connection");
                return ConnectionState::Cancelled;
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&read_buf[..n]);
                if events.send(ConnectionEvent::Received { id, chunk }).await.is_err() {
                    return ConnectionState::Cancelled;
                }
            }
            Err(e) => {
                return ConnectionState::Failed(format!("Read error: {}", e));
            }
        }
    }
}
