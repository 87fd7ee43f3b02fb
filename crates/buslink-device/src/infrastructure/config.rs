//! TOML configuration for the device binary.
//!
//! ```toml
//! log_level = "info"
//!
//! [link]
//! master_addr = "127.0.0.1:7890"
//! read_timeout_ms = 0
//! nodelay = true
//!
//! [device]
//! vendor_id = 0x1AF4
//! device_id = 0x0100
//! name = "scratch"
//! endianness = "little"
//! irq_line = 5
//!
//! [[device.memory_regions]]
//! base = 0x1000
//! size = 0x20
//! ```
//!
//! Every field has a default, so a missing file or a partial file still
//! yields a usable configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use buslink_core::protocol::messages::{DeviceEndianness, MemoryRegion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::descriptor::{DescriptorError, DeviceDescriptor};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub device: DeviceSection,
}

/// Where and how to reach the master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    #[serde(default = "default_master_addr")]
    pub master_addr: String,
    /// Read deadline in milliseconds. `0` waits forever.
    #[serde(default)]
    pub read_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

/// Identity and address map registered with the master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u32,
    #[serde(default = "default_device_id")]
    pub device_id: u32,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default)]
    pub endianness: DeviceEndianness,
    /// Interrupt line the demo peripheral signals on.
    #[serde(default = "default_irq_line")]
    pub irq_line: u8,
    #[serde(default = "default_memory_regions")]
    pub memory_regions: Vec<MemoryRegion>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_master_addr() -> String {
    "127.0.0.1:7890".to_string()
}
fn default_true() -> bool {
    true
}
fn default_vendor_id() -> u32 {
    0x1AF4
}
fn default_device_id() -> u32 {
    0x0100
}
fn default_name() -> String {
    "scratch".to_string()
}
fn default_description() -> String {
    "scratch register bank with timer and DMA engine".to_string()
}
fn default_irq_line() -> u8 {
    5
}
fn default_memory_regions() -> Vec<MemoryRegion> {
    vec![MemoryRegion {
        base: 0x1000,
        size: 0x20,
    }]
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            link: LinkConfig::default(),
            device: DeviceSection::default(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            master_addr: default_master_addr(),
            read_timeout_ms: 0,
            nodelay: default_true(),
        }
    }
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            device_id: default_device_id(),
            name: default_name(),
            description: default_description(),
            endianness: DeviceEndianness::default(),
            irq_line: default_irq_line(),
            memory_regions: default_memory_regions(),
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

impl DeviceSection {
    /// Builds the registration descriptor, validating every limit.
    pub fn to_descriptor(&self) -> Result<DeviceDescriptor, DescriptorError> {
        let mut descriptor = DeviceDescriptor::new();
        descriptor
            .set_descriptor(self.vendor_id, self.device_id, &self.name, &self.description)?
            .set_endianness(self.endianness);
        for region in &self.memory_regions {
            descriptor.add_memory_region(region.base, region.size)?;
        }
        Ok(descriptor)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<DeviceConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeviceConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config(path: &Path, config: &DeviceConfig) -> Result<(), ConfigError> {
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
