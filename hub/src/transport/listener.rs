//! Listener: accepts companion connections and advertises the service

use super::beacon::run_beacon;
use crate::config::HubConfig;
use coherence_shared::ServiceAnnouncement;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A connection accepted by the listener, to be handed to the connection manager
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub addr: SocketAddr,
}

/// Accept loop plus advertisement, started and stopped as one unit
pub struct Listener {
    accepted: mpsc::Sender<Accepted>,
    accept_task: Option<JoinHandle<()>>,
    beacon_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Listener {
    pub fn new(accepted: mpsc::Sender<Accepted>) -> Self {
        Self {
            accepted,
            accept_task: None,
            beacon_task: None,
            local_addr: None,
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.accept_task.is_some()
    }

    /// Address the listener is bound to while discovering
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind, start accepting and start advertising
    ///
    /// Returns `false` if nothing was started: either discovery is already
    /// running or the bind failed (logged, not fatal).
    pub async fn start(&mut self, config: &HubConfig) -> bool {
        if self.is_discovering() {
            return false;
        }

        let listener = match TcpListener::bind(config.bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind listener on {}: {}", config.bind_addr, e);
                return false;
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Listener has no local address: {}", e);
                return false;
            }
        };

        info!("Hub listening on {}", local_addr);

        self.accept_task = Some(tokio::spawn(accept_loop(listener, self.accepted.clone())));

        if let Some(target) = config.beacon_addr {
            let announcement = ServiceAnnouncement::new(
                config.service_type.clone(),
                config.service_name.clone(),
                local_addr.port(),
            );
            self.beacon_task = Some(tokio::spawn(run_beacon(
                announcement,
                target,
                config.beacon_interval,
            )));
        }

        self.local_addr = Some(local_addr);
        true
    }

    /// Stop accepting and advertising; returns `false` if not discovering
    pub fn stop(&mut self) -> bool {
        if let Some(task) = self.beacon_task.take() {
            task.abort();
        }
        self.local_addr = None;

        match self.accept_task.take() {
            Some(task) => {
                task.abort();
                info!("Hub listener stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(listener: TcpListener, accepted: mpsc::Sender<Accepted>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if accepted.send(Accepted { stream, addr }).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                // Per-connection accept failures (e.g. fd exhaustion) are transient
                warn!("Accept error: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HubConfig {
        HubConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            beacon_addr: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (tx, _rx) = mpsc::channel(4);
        let mut listener = Listener::new(tx);

        assert!(listener.start(&test_config()).await);
        let addr = listener.local_addr();
        assert!(!listener.start(&test_config()).await);

        assert!(listener.is_discovering());
        assert_eq!(listener.local_addr(), addr);
    }

    #[tokio::test]
    async fn test_stop_when_not_discovering() {
        let (tx, _rx) = mpsc::channel(4);
        let mut listener = Listener::new(tx);

        assert!(!listener.stop());
        assert!(!listener.is_discovering());
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_discovery_off() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = HubConfig {
            bind_addr: occupied.local_addr().unwrap(),
            beacon_addr: None,
            ..Default::default()
        };

        let (tx, _rx) = mpsc::channel(4);
        let mut listener = Listener::new(tx);

        assert!(!listener.start(&config).await);
        assert!(!listener.is_discovering());
        assert_eq!(listener.local_addr(), None);
    }

    #[tokio::test]
    async fn test_accepted_streams_are_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut listener = Listener::new(tx);
        listener.start(&test_config()).await;

        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let accepted = rx.recv().await.unwrap();
        assert!(accepted.addr.ip().is_loopback());
    }
}
