//! Configuration for the relay daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PARLEY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/parley/config.toml
//!   3. ~/.config/parley/config.toml

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which transport a relay instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Reliable, ordered, connection-oriented (TCP).
    Tcp,
    /// Unreliable, unordered, packet-bounded (UDP).
    Udp,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub transport: TransportKind,
    /// Listen port. Conventional defaults: 6000 for tcp, 5000 for udp.
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            port: 6000,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RelayConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        if let Ok(explicit) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(explicit);
        }
        config_home().join("parley").join("config.toml")
    }

    /// Write a commented default config if none exists yet.
    pub fn write_default_if_missing() -> Result<(), ConfigError> {
        let path = Self::file_path();
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        let text =
            toml::to_string_pretty(&RelayConfig::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path, e))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PARLEY_PORT") {
            if let Ok(port) = port.parse() {
                self.network.port = port;
            }
        }
        if let Ok(transport) = std::env::var("PARLEY_TRANSPORT") {
            match transport.to_ascii_lowercase().as_str() {
                "tcp" => self.network.transport = TransportKind::Tcp,
                "udp" => self.network.transport = TransportKind::Udp,
                _ => {}
            }
        }
    }
}

fn config_home() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg);
    }
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".config"))
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
