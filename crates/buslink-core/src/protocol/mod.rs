//! Protocol module containing packet types, the binary codec and the
//! stream framing loop.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod sequence;

pub use codec::{decode_packet, encode_packet, CodecError};
pub use frame::{read_packet, write_packet};
pub use messages::*;
pub use sequence::RequestIdCounter;
