//! Bus link master entry point.
//!
//! Listens for devices and runs one session per connection, each with its
//! own guest RAM and clock.
//!
//! ```text
//! main()
//!  └─ load_config()              -- TOML file, defaults when absent
//!  └─ TcpListener::bind()
//!  └─ per connection (thread):
//!      └─ accept_registration()  -- validate descriptor, answer Error{0}
//!      └─ init()                 -- Init request
//!      └─ probe()                -- read the first register of each region
//!      └─ serve()                -- device events, DMA, GetTime, timers
//! ```

use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use buslink_master::infrastructure::config::{load_config, MachineConfig};
use buslink_master::{GuestMemory, Machine, MasterError, MasterLink, SystemClock};

#[derive(Debug, Parser)]
#[command(
    name = "buslink-master",
    about = "Reference bus master serving out-of-process devices over TCP",
    version
)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, default_value = "buslink-master.toml", env = "BUSLINK_MASTER_CONFIG")]
    config: PathBuf,

    /// Overrides `network.bind_address`.
    #[arg(long, env = "BUSLINK_BIND")]
    bind: Option<String>,

    /// Overrides `network.port`.
    #[arg(long, env = "BUSLINK_PORT")]
    port: Option<u16>,

    /// Overrides `log_level` when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.network.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
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

    // Fail early on a bad RAM layout rather than per connection.
    GuestMemory::with_regions(&config.machine.ram).context("invalid guest RAM layout")?;

    let addr = config.network.listen_addr()?;
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
    info!(%addr, "bus link master listening");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let machine_config = config.machine.clone();
        thread::spawn(move || {
            let peer = stream
                .peer_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            match run_session(stream, &machine_config) {
                Ok(()) => info!(%peer, "session finished"),
                Err(e) => error!(%peer, error = %e, "session failed"),
            }
        });
    }
    Ok(())
}

fn run_session(stream: TcpStream, config: &MachineConfig) -> Result<(), MasterError> {
    stream.set_nodelay(true).map_err(buslink_core::LinkError::Io)?;
    let memory = GuestMemory::with_regions(&config.ram)
        .map_err(|e| MasterError::Registration(e.to_string()))?;
    let machine = Machine::new(memory, Box::new(SystemClock::new()))
        .with_target_endianness(config.target_endianness);
    let mut link = MasterLink::new(stream, machine);

    let device = link.accept_registration()?.clone();
    link.init()?;
    for region in &device.memory_regions {
        if region.size < 4 {
            continue;
        }
        match link.read_u32(region.base) {
            Ok(value) => info!(base = region.base, value, "probed region"),
            Err(MasterError::Link(buslink_core::LinkError::Remote { code })) => {
                warn!(base = region.base, code, "device refused probe read")
            }
            Err(e) => return Err(e),
        }
    }

    link.serve(config.tick_interval())
}
