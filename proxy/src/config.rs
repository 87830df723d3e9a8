//! Proxy configuration: defaults, JSON file loading, CLI overrides.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file")]
    Io(#[from] io::Error),
    #[error("unable to parse config file")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    pub server_ip: String,
    pub server_port: u16,
    pub server_name: String,
    pub max_players: usize,
    /// Registry tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Idle timeout before a session is disconnected, in milliseconds.
    pub session_timeout_ms: u64,
    /// Pacing delay between consecutive pass-through frame sends during a
    /// flush, in milliseconds.
    pub batch_pacing_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server_ip: "0.0.0.0".to_string(),
            server_port: 19132,
            server_name: "Bedrock Proxy".to_string(),
            max_players: 100,
            tick_interval_ms: 50,
            session_timeout_ms: 30_000,
            batch_pacing_ms: 1,
        }
    }
}

impl ProxyConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
