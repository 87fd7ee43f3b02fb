//! Infrastructure layer for the bus master.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `buslink_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`link`** – [`MasterLink`](link::MasterLink): one device session,
//!   registration acceptance and master-initiated I/O.
//! - **`clock`** – wall-clock and manually driven [`VirtualClock`](crate::application::clock::VirtualClock)s.
//! - **`config`** – TOML configuration for the binary.

pub mod clock;
pub mod config;
pub mod link;
