//! Persistent connection to the hub with automatic reconnection

use crate::config::CompanionConfig;
use crate::discovery::HubLocator;
use crate::telemetry::TelemetrySource;
use anyhow::{anyhow, Result};
use coherence_shared::{codec, CompanionMessage};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::debug;

/// Events emitted by the connection loop
#[derive(Debug, Clone, PartialEq)]
pub enum CompanionEvent {
    /// Hub address resolved
    Located { addr: SocketAddr, via: &'static str },
    /// Connected to the hub
    Connected { addr: SocketAddr },
    /// Connection lost after having been established
    Disconnected { reason: String },
    /// Locating or connecting failed; retrying after `retry_in`
    ConnectionFailed { reason: String, retry_in: Duration },
}

/// Next reconnect delay after `current`, doubling up to `max`
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current * 2, max)
}

/// Locate, connect, stream telemetry; forever
pub async fn connection_loop<L>(
    config: CompanionConfig,
    locator: L,
    source: TelemetrySource,
    events: mpsc::Sender<CompanionEvent>,
) where
    L: HubLocator,
{
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        let failure = match connect(&config, &locator, &events).await {
            Ok((stream, addr)) => {
                reconnect_delay = config.reconnect_delay;
                let _ = events.send(CompanionEvent::Connected { addr }).await;

                let reason = match stream_telemetry(stream, &config, &source).await {
                    Ok(()) => "Hub closed connection".to_string(),
                    Err(e) => e.to_string(),
                };
                let _ = events.send(CompanionEvent::Disconnected { reason }).await;
                None
            }
            Err(e) => Some(e.to_string()),
        };

        if let Some(reason) = failure {
            let _ = events
                .send(CompanionEvent::ConnectionFailed {
                    reason,
                    retry_in: reconnect_delay,
                })
                .await;
        }

        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = next_backoff(reconnect_delay, config.max_reconnect_delay);
    }
}

async fn connect<L: HubLocator>(
    config: &CompanionConfig,
    locator: &L,
    events: &mpsc::Sender<CompanionEvent>,
) -> Result<(TcpStream, SocketAddr)> {
    let addr = locator.locate().await?;
    let _ = events
        .send(CompanionEvent::Located {
            addr,
            via: locator.name(),
        })
        .await;

    let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| anyhow!("Connect to {} timed out", addr))??;
    Ok((stream, addr))
}

/// Send `deviceInfo`, then a health update every interval until the hub goes away
///
/// Returns `Ok(())` when the hub closes the connection.
async fn stream_telemetry(
    stream: TcpStream,
    config: &CompanionConfig,
    source: &TelemetrySource,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let hello = codec::encode(&CompanionMessage::device_info(config.name.clone()))?;
    writer.write_all(&hello).await?;

    // First update one interval after the hello so the two never share a read
    let mut ticker = interval_at(Instant::now() + config.update_interval, config.update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The hub never sends; reads only detect closure
    let mut read_buf = [0u8; 256];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reading = source.sample();
                let encoded = codec::encode(&reading.to_message())?;
                writer.write_all(&encoded).await?;
                debug!(
                    hrv = reading.hrv,
                    heart_rate = reading.heart_rate,
                    coherence = reading.coherence,
                    "Sent health update"
                );
            }

            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => return Ok(()),
                    Ok(n) => debug!("Ignoring {} bytes from hub", n),
                    Err(e) => return Err(anyhow!("Read error: {}", e)),
                }
            }
        }
    }
}
