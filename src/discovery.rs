//! Locating the hub on the local network

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use coherence_shared::ServiceAnnouncement;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info};

/// Resolves the address of a hub to connect to
#[async_trait]
pub trait HubLocator: Send + Sync {
    async fn locate(&self) -> Result<SocketAddr>;

    /// Human-readable name for logs
    fn name(&self) -> &'static str;
}

/// Always returns a configured address
pub struct StaticLocator {
    addr: SocketAddr,
}

impl StaticLocator {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl HubLocator for StaticLocator {
    async fn locate(&self) -> Result<SocketAddr> {
        Ok(self.addr)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Waits for a hub service announcement on a UDP port
pub struct BeaconLocator {
    bind_addr: SocketAddr,
    service_type: String,
    wait: Duration,
}

impl BeaconLocator {
    pub fn new(port: u16, service_type: impl Into<String>, wait: Duration) -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            service_type: service_type.into(),
            wait,
        }
    }

    /// Listen on an explicit address instead of the wildcard
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    async fn receive(&self, socket: &UdpSocket) -> Result<SocketAddr> {
        let mut buf = [0u8; 1024];
        loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            match ServiceAnnouncement::from_bytes(&buf[..len]) {
                Some(ann) if ann.service == self.service_type => {
                    let hub = SocketAddr::new(from.ip(), ann.port);
                    info!("[DISCOVERY] Found '{}' at {}", ann.name, hub);
                    return Ok(hub);
                }
                Some(ann) => debug!("[DISCOVERY] Ignoring service {} from {}", ann.service, from),
                None => debug!("[DISCOVERY] Ignoring {} byte datagram from {}", len, from),
            }
        }
    }
}

#[async_trait]
impl HubLocator for BeaconLocator {
    async fn locate(&self) -> Result<SocketAddr> {
        let socket = UdpSocket::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind discovery socket on {}", self.bind_addr))?;

        debug!("[DISCOVERY] Listening for {} on {}", self.service_type, self.bind_addr);
        timeout(self.wait, self.receive(&socket))
            .await
            .map_err(|_| anyhow!("No hub announced within {:?}", self.wait))?
    }

    fn name(&self) -> &'static str {
        "beacon"
    }
}
