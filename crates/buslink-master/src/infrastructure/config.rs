//! TOML configuration for the master binary.
//!
//! ```toml
//! log_level = "info"
//!
//! [network]
//! bind_address = "127.0.0.1"
//! port = 7890
//!
//! [machine]
//! target_endianness = "little"
//! tick_interval_ms = 10
//!
//! [[machine.ram]]
//! base = 0x8000_0000
//! size = 0x10_0000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use buslink_core::protocol::messages::{MemoryRegion, TargetEndianness};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid listen address '{0}'")]
    Address(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub machine: MachineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    /// Guest RAM regions; device DMA is served from these.
    #[serde(default = "default_ram")]
    pub ram: Vec<MemoryRegion>,
    #[serde(default)]
    pub target_endianness: TargetEndianness,
    /// How often the serve loop checks for due device timers.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7890
}
fn default_ram() -> Vec<MemoryRegion> {
    vec![MemoryRegion {
        base: 0x8000_0000,
        size: 0x10_0000,
    }]
}
fn default_tick_interval_ms() -> u64 {
    10
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            network: NetworkConfig::default(),
            machine: MachineConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram: default_ram(),
            target_endianness: TargetEndianness::default(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let text = format!("{}:{}", self.bind_address, self.port);
        text.parse().map_err(|_| ConfigError::Address(text))
    }
}

impl MachineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the config at `path`, returning defaults if the file does not exist.
pub fn load_config(path: &Path) -> Result<MasterConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MasterConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config(path: &Path, config: &MasterConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
