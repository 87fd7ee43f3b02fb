//! # buslink-core
//!
//! Shared library for the device bus link: a point-to-point protocol that
//! lets an out-of-process peripheral model (the "device") attach to an
//! emulated machine (the "master") over a single reliable byte stream.
//!
//! This crate is used by both sides of the link. It does no socket set-up of
//! its own; every session is generic over any `Read + Write` stream.
//!
//! - **`protocol`** – Packet types, the binary codec and the two-phase
//!   framing loop. Every packet starts with a 5-byte prefix
//!   (`total_size u32 | outer_kind u8`, little-endian) followed by a
//!   kind-specific body.
//!
//! - **`link`** – The [`Channel`] that owns a stream and its request-id
//!   counter, the [`LinkError`] taxonomy, and the [`Peer`] correlator that
//!   matches responses to requests while dispatching everything else that
//!   arrives in between.

pub mod link;
pub mod protocol;

pub use link::{Channel, LinkError, LinkState, Peer};
pub use protocol::codec::{decode_packet, encode_packet, CodecError};
pub use protocol::messages::{Event, Packet, Request, Response};
