//! Client and server configuration
//!
//! Both configs deserialize from YAML with per-field defaults, so a file only
//! needs the keys it wants to change. Durations are stored as milliseconds and
//! exposed as [`Duration`] through accessors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`ClientConfig::address`]
pub const ADDRESS_ENV: &str = "SOCKETRY_ADDRESS";
/// Environment variable overriding [`ServerConfig::bind_address`]
pub const BIND_ENV: &str = "SOCKETRY_BIND";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Wire protocol selector used by the binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw byte stream, no framing or heartbeat
    Tcp,
    /// WebSocket frames with ping/pong heartbeat
    #[default]
    Ws,
}

fn default_address() -> String {
    "ws://127.0.0.1:8080/".to_string()
}
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_path() -> String {
    "/".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_write_timeout_ms() -> u64 {
    10_000
}
fn default_reconnect_delay_ms() -> u64 {
    5_000
}
fn default_ping_interval_ms() -> u64 {
    30_000
}
fn default_pong_wait_ms() -> u64 {
    60_000
}
fn default_buffer_size() -> usize {
    4096
}
fn default_handshake_timeout_ms() -> u64 {
    10_000
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration for a [`ClientSession`](crate::core::client::ClientSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `host:port` for TCP, `ws://host:port/path` for WebSocket
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-read timeout when no heartbeat governs the deadline, 0 disables
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// 0 = retry forever
    #[serde(default)]
    pub max_reconnects: u32,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Framed transports only, 0 disables the heartbeat
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,

    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,

    /// Extra HTTP headers sent with the WebSocket upgrade request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            transport: TransportKind::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnects: 0,
            auto_reconnect: true,
            ping_interval_ms: default_ping_interval_ms(),
            pong_wait_ms: default_pong_wait_ms(),
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            headers: HashMap::new(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Load from YAML, apply `SOCKETRY_ADDRESS`, then validate
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml_content = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = serde_yaml::from_str(&yaml_content)?;

        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            config.address = address;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "address must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "write_timeout_ms must be greater than 0".to_string(),
            ));
        }
        validate_heartbeat(self.ping_interval_ms, self.pong_wait_ms)?;
        validate_buffers(self.read_buffer_size, self.write_buffer_size)
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.max_reconnects = max_reconnects;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_heartbeat(mut self, ping_interval: Duration, pong_wait: Duration) -> Self {
        self.ping_interval_ms = ping_interval.as_millis() as u64;
        self.pong_wait_ms = pong_wait.as_millis() as u64;
        self
    }

    pub fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }
}

/// Configuration for a [`Server`](crate::server::Server)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub transport: TransportKind,

    /// Upgrade path accepted by the WebSocket transport
    #[serde(default = "default_path")]
    pub path: String,

    /// 0 = unlimited
    #[serde(default)]
    pub max_connections: usize,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,

    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Upper bound on how long `stop()` waits for peers and workers
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            transport: TransportKind::default(),
            path: default_path(),
            max_connections: 0,
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            pong_wait_ms: default_pong_wait_ms(),
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            ..Self::default()
        }
    }

    /// Load from YAML, apply `SOCKETRY_BIND`, then validate
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml_content = std::fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&yaml_content)?;

        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind_address = bind;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "bind_address must not be empty".to_string(),
            ));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "path must start with '/', got '{}'",
                self.path
            )));
        }
        if self.write_timeout_ms == 0 || self.handshake_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "write_timeout_ms and handshake_timeout_ms must be greater than 0".to_string(),
            ));
        }
        validate_heartbeat(self.ping_interval_ms, self.pong_wait_ms)?;
        validate_buffers(self.read_buffer_size, self.write_buffer_size)
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_heartbeat(mut self, ping_interval: Duration, pong_wait: Duration) -> Self {
        self.ping_interval_ms = ping_interval.as_millis() as u64;
        self.pong_wait_ms = pong_wait.as_millis() as u64;
        self
    }

    pub fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn validate_heartbeat(ping_interval_ms: u64, pong_wait_ms: u64) -> ConfigResult<()> {
    // A pong must be able to arrive after the ping that asked for it
    if ping_interval_ms > 0 && pong_wait_ms <= ping_interval_ms {
        return Err(ConfigError::ValidationError(format!(
            "pong_wait_ms ({}) must be greater than ping_interval_ms ({})",
            pong_wait_ms, ping_interval_ms
        )));
    }
    Ok(())
}

fn validate_buffers(read: usize, write: usize) -> ConfigResult<()> {
    if read == 0 || write == 0 {
        return Err(ConfigError::ValidationError(
            "buffer sizes must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
