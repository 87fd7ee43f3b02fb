//! buslink-device library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! A device is an out-of-process peripheral model. It connects to the bus
//! master, registers a descriptor naming the MMIO regions it decodes, and
//! then serves reads and writes from the master while issuing interrupts,
//! DMA and timer requests of its own:
//!
//! 1. Build a [`DeviceDescriptor`] (vendor/device ids, name, regions).
//! 2. [`DeviceLink::connect`] to the master and [`DeviceLink::register`]
//!    the descriptor together with a [`Peripheral`] implementation.
//! 3. Call `run_loop()` (from [`buslink_core::Peer`]) until the master
//!    disconnects.

/// Application layer: peripheral traits, descriptor, dispatcher, timers.
pub mod application;

/// Infrastructure layer: TCP session, configuration, demo peripheral.
pub mod infrastructure;

pub use application::descriptor::{DescriptorError, DeviceDescriptor};
pub use application::peripheral::{CallbackError, DeviceBus, ExitReason, Peripheral, TimerCallback};
pub use infrastructure::link::DeviceLink;
