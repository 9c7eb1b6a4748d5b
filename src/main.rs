mod config;
mod connection;
mod discovery;
mod telemetry;

use config::CompanionConfig;
use connection::{connection_loop, CompanionEvent};
use discovery::{BeaconLocator, StaticLocator};
use telemetry::TelemetrySource;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = CompanionConfig::from_env()?;

    info!("Companion starting: {}", config.name);
    match config.hub_addr {
        Some(addr) => info!("  Hub: {}", addr),
        None => info!("  Hub: discovered via UDP port {}", config.discovery_port),
    }
    info!("  Update interval: {:?}", config.update_interval);

    let (event_tx, mut event_rx) = mpsc::channel::<CompanionEvent>(100);
    let source = TelemetrySource::new();

    let worker = match config.hub_addr {
        Some(addr) => tokio::spawn(connection_loop(
            config.clone(),
            StaticLocator::new(addr),
            source,
            event_tx,
        )),
        None => {
            let locator = BeaconLocator::new(
                config.discovery_port,
                config.service_type.clone(),
                config.discovery_timeout,
            );
            tokio::spawn(connection_loop(config.clone(), locator, source, event_tx))
        }
    };

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(CompanionEvent::Located { addr, via }) => {
                    info!("Hub located at {} ({})", addr, via);
                }
                Some(CompanionEvent::Connected { addr }) => {
                    info!("Connected to hub at {}", addr);
                }
                Some(CompanionEvent::Disconnected { reason }) => {
                    warn!("Disconnected: {}", reason);
                }
                Some(CompanionEvent::ConnectionFailed { reason, retry_in }) => {
                    error!("Connection failed: {} (retrying in {:?})", reason, retry_in);
                }
                None => {
                    error!("Connection loop stopped");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    worker.abort();
    Ok(())
}
