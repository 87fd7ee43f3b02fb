//! Application layer for the device side of the link.
//!
//! - **`peripheral`** – The [`Peripheral`](peripheral::Peripheral) trait a
//!   device model implements and the [`DeviceBus`](peripheral::DeviceBus)
//!   trait through which it talks back to the master.
//! - **`descriptor`** – Validated registration descriptor.
//! - **`dispatch`** – Routes inbound requests and events to the peripheral
//!   and turns callback outcomes into protocol responses.
//! - **`timers`** – Session-local table of pending timer callbacks.
//!
//! Nothing here touches a socket; the session in `infrastructure::link`
//! wires these pieces to a byte stream.

pub mod descriptor;
pub mod dispatch;
pub mod peripheral;
pub mod timers;
