//! Client configuration.
//!
//! ```toml
//! [relay]
//! host = "duepiwebserver2.com"
//! port = 3000
//! device_code = "ABC123"
//!
//! [timing]
//! command_timeout_ms = 5000
//! command_delay_ms = 200
//! ```
//!
//! Every field is optional in the file; the device code must be present once
//! CLI and environment overrides have been applied (see [`ClientConfig::validate`]).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "duepiwebserver2.com";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Opaque per-unit token sent in the handshake.
    #[serde(default)]
    pub device_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Wait after the handshake before the relay is assumed ready.
    #[serde(default = "default_handshake_settle_ms")]
    pub handshake_settle_ms: u64,
    /// Serial-bus turnaround between two commands.
    #[serde(default = "default_command_delay_ms")]
    pub command_delay_ms: u64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_handshake_settle_ms() -> u64 {
    500
}
fn default_command_delay_ms() -> u64 {
    200
}
fn default_queue_depth() -> usize {
    32
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            device_code: String::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_timeout_ms(),
            command_timeout_ms: default_timeout_ms(),
            handshake_settle_ms: default_handshake_settle_ms(),
            command_delay_ms: default_command_delay_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl TimingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
    pub fn handshake_settle(&self) -> Duration {
        Duration::from_millis(self.handshake_settle_ms)
    }
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16, device_code: impl Into<String>) -> Self {
        Self {
            relay: RelayConfig {
                host: host.into(),
                port,
                device_code: device_code.into(),
            },
            timing: TimingConfig::default(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.relay.host, self.relay.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.host.trim().is_empty() {
            return Err(ConfigError::Invalid("relay host is empty".into()));
        }
        if self.relay.device_code.is_empty() {
            return Err(ConfigError::Invalid(
                "device code is not set (use --device or DUEPI_DEVICE_CODE)".into(),
            ));
        }
        // '#' terminates the handshake line.
        if self.relay.device_code.contains('#') || !self.relay.device_code.is_ascii() {
            return Err(ConfigError::Invalid(
                "device code must be ASCII without '#'".into(),
            ));
        }
        if self.timing.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth must be at least 1".into()));
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
