//! Session layer: the byte-stream channel, its lifecycle state, the error
//! taxonomy and the request/response correlator shared by both roles.

pub mod channel;
pub mod error;
pub mod mock;
pub mod peer;

pub use channel::Channel;
pub use error::{LinkError, LinkState};
pub use peer::Peer;
