//! Infrastructure layer for the device side.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `buslink_core`, but MUST NOT be imported by the `application` layer.
//!
//! - **`link`** – [`DeviceLink`](link::DeviceLink): the session over a TCP
//!   (or any duplex) stream.
//! - **`config`** – TOML configuration for the binary.
//! - **`scratch`** – A demo peripheral that drives every bus operation.

pub mod config;
pub mod link;
pub mod scratch;
