//! Engine, server and client configuration with validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default listening port of the editor bridge.
pub const DEFAULT_PORT: u16 = 6500;

/// Default bind host. Loopback only; the bridge has no authentication.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Protocol engine tunables shared by both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest accepted frame in bytes (default: 4 MiB)
    pub max_frame_size: usize,
    /// Bytes requested per socket read (default: 64 KiB)
    pub read_chunk_size: usize,
    /// Waiter timeout when the caller gives none
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Upper bound on a single frame write before the connection is dropped
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    /// How long shutdown waits for session tasks before aborting them
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,
    /// Number of settled ids remembered to drop late or duplicate replies
    pub expired_id_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 4 * 1024 * 1024,
            read_chunk_size: 64 * 1024,
            default_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(5),
            expired_id_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_frame_size must be > 0".into(),
            ));
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "read_chunk_size must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("default_timeout", self.default_timeout),
            ("write_timeout", self.write_timeout),
            ("drain_timeout", self.drain_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// Listening end configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port; 0 picks an ephemeral port
    pub port: u16,
    /// Engine tunables
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        self.engine.validate()
    }
}

/// Connecting end configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name announced in the `connection` handshake
    pub client_name: String,
    /// Version announced in the `connection` handshake
    pub client_version: String,
    /// Send the `connection` / `disconnect` handshake envelopes
    pub handshake: bool,
    /// Engine tunables
    pub engine: EngineConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: "editor-plugin".to_owned(),
            client_version: env!("CARGO_PKG_VERSION").to_owned(),
            handshake: true,
            engine: EngineConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
