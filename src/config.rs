//! Service configuration loaded from the environment

use anyhow::{anyhow, bail, Context, Result};
use servo_core::MAX_CHANNELS;
use std::time::Duration;

/// Which hardware backend drives the servos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// In-memory servo bank (for development)
    #[default]
    Simulated,
    /// Multi-channel controller on a serial port
    Serial,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("simulated") {
            Ok(BackendKind::Simulated)
        } else if s.eq_ignore_ascii_case("serial") {
            Ok(BackendKind::Serial)
        } else {
            Err(anyhow!("unknown backend {:?} (expected simulated or serial)", s))
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Simulated => write!(f, "simulated"),
            BackendKind::Serial => write!(f, "serial"),
        }
    }
}

/// Serial controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Device path of the controller
    pub port: String,
    pub baud_rate: u32,
    /// Read/write timeout per transaction
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Configuration for the servo service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Number of servo channels on the device
    pub channel_count: usize,
    /// TCP address to accept clients on
    pub listen_address: String,
    pub backend: BackendKind,
    pub serial: SerialConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            channel_count: 8,
            listen_address: "127.0.0.1:7400".into(),
            backend: BackendKind::Simulated,
            serial: SerialConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from `SERVO_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("SERVO_CHANNELS") {
            config.channel_count = value
                .parse()
                .with_context(|| format!("invalid SERVO_CHANNELS {:?}", value))?;
            if config.channel_count > MAX_CHANNELS {
                bail!(
                    "SERVO_CHANNELS {} exceeds the {} channels a reply can carry",
                    config.channel_count,
                    MAX_CHANNELS
                );
            }
        }
        if let Some(value) = lookup("SERVO_LISTEN") {
            config.listen_address = value;
        }
        if let Some(value) = lookup("SERVO_BACKEND") {
            config.backend = value.parse().context("invalid SERVO_BACKEND")?;
        }
        if let Some(value) = lookup("SERVO_SERIAL_PORT") {
            config.serial.port = value;
        }
        if let Some(value) = lookup("SERVO_SERIAL_BAUD") {
            config.serial.baud_rate = value
                .parse()
                .with_context(|| format!("invalid SERVO_SERIAL_BAUD {:?}", value))?;
        }
        if let Some(value) = lookup("SERVO_SERIAL_TIMEOUT_MS") {
            let millis: u64 = value
                .parse()
                .with_context(|| format!("invalid SERVO_SERIAL_TIMEOUT_MS {:?}", value))?;
            config.serial.timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}
