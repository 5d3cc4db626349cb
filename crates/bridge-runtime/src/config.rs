//! Runtime configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use bridge_engine::ServerConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Listener and engine settings
    pub server: ServerConfig,
    /// `EnvFilter` directive
    pub log_level: String,
    /// Emit JSON log lines instead of plain text
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BRIDGE_HOST`: Bind host (default: 127.0.0.1)
    /// - `BRIDGE_PORT`: Bind port (default: 6500)
    /// - `BRIDGE_MAX_FRAME_BYTES`: Largest accepted frame (default: 4 MiB)
    /// - `BRIDGE_REQUEST_TIMEOUT_SECS`: Default reply timeout (default: 10)
    /// - `BRIDGE_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `BRIDGE_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("BRIDGE_HOST").filter(|h| !h.trim().is_empty()) {
            config.server.host = host;
        }
        if let Some(port) = parsed(&lookup, "BRIDGE_PORT") {
            config.server.port = port;
        }
        if let Some(max) = parsed(&lookup, "BRIDGE_MAX_FRAME_BYTES") {
            config.server.engine.max_frame_size = max;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "BRIDGE_REQUEST_TIMEOUT_SECS") {
            config.server.engine.default_timeout = Duration::from_secs(secs);
        }

        config.log_level = lookup("BRIDGE_LOG_LEVEL")
            .or_else(|| lookup("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());

        config.json_logs = lookup("BRIDGE_JSON_LOGS")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        config
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}
