//! buslink-master library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The master stands in for the emulated machine. It accepts a device's
//! registration, reads and writes the MMIO regions the device claimed, and
//! serves the device's interrupts, DMA into guest RAM, clock queries and
//! timers:
//!
//! 1. Build a [`Machine`] from guest RAM regions and a [`VirtualClock`].
//! 2. [`MasterLink::accept`] a device and [`MasterLink::accept_registration`].
//! 3. Drive the device (`init`, `read_u32`, `write_u32`, ...) and call
//!    [`MasterLink::serve`] until it disconnects.

/// Application layer: guest memory, interrupt lines, timers, clock.
pub mod application;

/// Infrastructure layer: TCP session, clocks, configuration.
pub mod infrastructure;

pub use application::clock::VirtualClock;
pub use application::machine::Machine;
pub use application::memory::{GuestMemory, MemoryError};
pub use infrastructure::clock::{ManualClock, SystemClock};
pub use infrastructure::link::{DeviceInfo, MasterError, MasterLink};
