//! Service advertisement over UDP
//!
//! While the hub is discovering it periodically sends a JSON
//! [`ServiceAnnouncement`] datagram (broadcast by default) so companions on
//! the same network can find the TCP port without configuration.

use coherence_shared::ServiceAnnouncement;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Send `announcement` to `target` every `period` until the task is aborted
pub async fn run_beacon(announcement: ServiceAnnouncement, target: SocketAddr, period: Duration) {
    let payload = match announcement.to_bytes() {
        Ok(p) => p,
        Err(e) => {
            warn!("[BEACON] Could not encode announcement: {}", e);
            return;
        }
    };

    let socket = match UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await {
        Ok(s) => s,
        Err(e) => {
            warn!("[BEACON] Could not bind advertisement socket: {}", e);
            return;
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        debug!("[BEACON] Broadcast not enabled: {}", e);
    }

    info!(
        "[BEACON] Advertising {} \"{}\" port {} to {}",
        announcement.service, announcement.name, announcement.port, target
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = socket.send_to(&payload, target).await {
            debug!("[BEACON] Announcement send failed: {}", e);
        }
    }
}
