//! Companion configuration

use anyhow::{Context, Result};
use coherence_shared::defaults;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CompanionConfig {
    /// Name reported to the hub in `deviceInfo`
    pub name: String,
    /// Fixed hub address; when unset the hub is located from its beacon
    pub hub_addr: Option<SocketAddr>,
    /// UDP port the hub beacon is received on
    pub discovery_port: u16,
    /// Service type a beacon must announce to be accepted
    pub service_type: String,
    /// How long to listen for one beacon before retrying
    pub discovery_timeout: Duration,
    /// Time between health updates
    pub update_interval: Duration,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            name: "Companion".into(),
            hub_addr: None,
            discovery_port: defaults::DISCOVERY_PORT,
            service_type: defaults::SERVICE_TYPE.into(),
            discovery_timeout: Duration::from_secs(10),
            update_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl CompanionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("COMPANION_NAME") {
            config.name = name;
        }
        if let Some(raw) = lookup("COMPANION_HUB_ADDR") {
            let addr = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid COMPANION_HUB_ADDR: {}", raw))?;
            config.hub_addr = Some(addr);
        }
        if let Some(raw) = lookup("COMPANION_DISCOVERY_PORT") {
            config.discovery_port = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid COMPANION_DISCOVERY_PORT: {}", raw))?;
        }
        if let Some(raw) = lookup("COMPANION_INTERVAL_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid COMPANION_INTERVAL_MS: {}", raw))?;
            anyhow::ensure!(ms > 0, "COMPANION_INTERVAL_MS must be positive");
            config.update_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}
