//! Hub configuration

use anyhow::{Context, Result};
use coherence_shared::{defaults, Framing};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address the TCP listener binds to
    pub bind_addr: SocketAddr,
    /// Where service announcements are sent (`None` disables advertising)
    pub beacon_addr: Option<SocketAddr>,
    /// Time between announcements
    pub beacon_interval: Duration,
    /// Advertised service type
    pub service_type: String,
    /// Advertised hub name
    pub service_name: String,
    /// How message boundaries are recovered from each connection
    pub framing: Framing,
    /// Largest single read (and buffered frame) per connection
    pub max_chunk_len: usize,
    /// Duration timer period
    pub tick_interval: Duration,
    /// Initial session target duration
    pub target_duration: Duration,
    /// Capacity of the internal event channels
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, defaults::HUB_PORT)),
            beacon_addr: Some(SocketAddr::from((Ipv4Addr::BROADCAST, defaults::DISCOVERY_PORT))),
            beacon_interval: Duration::from_millis(defaults::BEACON_INTERVAL_MS),
            service_type: defaults::SERVICE_TYPE.into(),
            service_name: defaults::SERVICE_NAME.into(),
            framing: Framing::PerRead,
            max_chunk_len: defaults::MAX_CHUNK_LEN,
            tick_interval: Duration::from_millis(defaults::TICK_INTERVAL_MS),
            target_duration: Duration::from_secs(defaults::TARGET_DURATION_SECS),
            channel_capacity: 1024,
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `COHERENCE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse(&lookup, "COHERENCE_BIND")? {
            config.bind_addr = addr;
        }
        if let Some(raw) = lookup("COHERENCE_BEACON_ADDR") {
            config.beacon_addr = match raw.trim() {
                "" | "off" | "none" => None,
                value => Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid COHERENCE_BEACON_ADDR: {}", value))?,
                ),
            };
        }
        if let Some(name) = lookup("COHERENCE_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Some(raw) = lookup("COHERENCE_FRAMING") {
            config.framing = raw
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid COHERENCE_FRAMING")?;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "COHERENCE_TARGET_SECS")? {
            config.target_duration = Duration::from_secs(secs);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "COHERENCE_TICK_MS")? {
            anyhow::ensure!(ms > 0, "COHERENCE_TICK_MS must be positive");
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(len) = parse::<usize, _>(&lookup, "COHERENCE_MAX_CHUNK")? {
            anyhow::ensure!(len > 0, "COHERENCE_MAX_CHUNK must be positive");
            config.max_chunk_len = len;
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {}: {}", key, raw))
        })
        .transpose()
}
