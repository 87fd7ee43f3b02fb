//! Application layer for the bus master.
//!
//! The pieces of an emulated machine a device can observe through the link:
//!
//! - **`memory`** – guest RAM regions, the target of device DMA.
//! - **`irq`** – interrupt line levels and edge counters.
//! - **`events`** – device timers waiting for their virtual deadline.
//! - **`clock`** – the virtual time source.
//! - **`machine`** – bundles the above and applies device events to them.

pub mod clock;
pub mod events;
pub mod irq;
pub mod machine;
pub mod memory;
