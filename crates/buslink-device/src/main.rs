//! Bus link device entry point.
//!
//! Connects to the bus master, registers the scratch demo peripheral and
//! serves the master until it disconnects.
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML file, defaults when absent
//!  └─ DeviceLink::connect()   -- TCP to the master
//!  └─ register()              -- Register request, wait for Error{0}
//!  └─ run_loop()              -- dispatch Read/Write/Init/Reset/timers
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use buslink_core::Peer;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use buslink_device::infrastructure::config::load_config;
use buslink_device::infrastructure::scratch::ScratchDevice;
use buslink_device::DeviceLink;

#[derive(Debug, Parser)]
#[command(
    name = "buslink-device",
    about = "Scratch register device attached to a bus master over TCP",
    version
)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, default_value = "buslink-device.toml", env = "BUSLINK_DEVICE_CONFIG")]
    config: PathBuf,

    /// Overrides `link.master_addr`.
    #[arg(long, env = "BUSLINK_MASTER_ADDR")]
    master_addr: Option<String>,

    /// Overrides `log_level` when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(addr) = cli.master_addr {
        config.link.master_addr = addr;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let descriptor = config
        .device
        .to_descriptor()
        .context("invalid device descriptor in configuration")?;
    let base = descriptor
        .memory_regions()
        .first()
        .map(|r| r.base)
        .context("device must claim at least one memory region")?;
    let device = ScratchDevice::new(base, config.device.irq_line);

    info!(master = %config.link.master_addr, name = descriptor.name(), "bus link device starting");
    let mut link = DeviceLink::connect(config.link.master_addr.as_str())
        .with_context(|| format!("connecting to {}", config.link.master_addr))?;
    link.set_nodelay(config.link.nodelay)?;
    link.set_read_timeout(config.link.read_timeout())?;

    link.register(descriptor, Arc::new(device.clone()))
        .context("registration with the bus master failed")?;

    if let Err(e) = link.run_loop() {
        error!(error = %e, "session ended with an error");
        return Err(e.into());
    }
    info!(ticks = device.ticks(), "master disconnected, device exiting");
    Ok(())
}
