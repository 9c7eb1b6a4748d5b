use coherence_hub::{HubConfig, HubNotification};
use coherence_shared::metrics;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = HubConfig::from_env()?;
    info!("Coherence hub starting: {}", config.service_name);
    info!("  Bind: {}", config.bind_addr);
    match config.beacon_addr {
        Some(addr) => info!("  Beacon: {} every {:?}", addr, config.beacon_interval),
        None => info!("  Beacon: disabled"),
    }
    info!("  Session target: {:?}", config.target_duration);

    let hub = coherence_hub::spawn(config);

    let mut notifications = hub.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => log_notification(&notification),
                Err(RecvError::Lagged(n)) => warn!("Notification log lagged by {}", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if hub.start_discovery().await?.is_none() {
        error!("Discovery could not start; companions will not be able to connect");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    hub.shutdown().await?;

    Ok(())
}

fn log_notification(notification: &HubNotification) {
    match notification {
        HubNotification::DiscoveryChanged { discovering } => {
            info!("Discovery {}", if *discovering { "started" } else { "stopped" });
        }
        HubNotification::DeviceConnected(device) => {
            info!("[{}] connected from {}", device.id, device.addr);
        }
        HubNotification::DeviceUpdated(device) => {
            info!(
                "[{}] {} hrv={:.1} hr={:.0} coherence={:.0} intensity={:.2}",
                device.id,
                device.name,
                device.hrv,
                device.heart_rate,
                device.coherence,
                metrics::feedback_intensity(device.coherence)
            );
        }
        HubNotification::DeviceDisconnected { id, reason } => {
            info!("[{}] disconnected: {:?}", id, reason);
        }
        HubNotification::SessionStateChanged { from, to, kind } => {
            info!("Session {} -> {} ({})", from, to, kind);
        }
        HubNotification::SessionTick { accrued, progress } => {
            info!("Session {}s ({:.0}%)", accrued.as_secs(), progress * 100.0);
        }
        HubNotification::SessionCompleted { kind, duration } => {
            info!("{} session completed after {}s", kind, duration.as_secs());
        }
        HubNotification::ParticipantsChanged { count } => {
            info!("Participants: {}", count);
        }
    }
}
