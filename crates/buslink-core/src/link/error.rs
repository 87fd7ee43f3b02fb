//! Error taxonomy for a bus link session.

use std::fmt;
use std::io::ErrorKind;

use thiserror::Error;

use crate::protocol::codec::CodecError;

/// Lifecycle state of a session.
///
/// `Connecting → Ready → Closed`. `Ready` is only entered after a successful
/// registration; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Ready,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Connecting => f.write_str("connecting"),
            LinkState::Ready => f.write_str("ready"),
            LinkState::Closed => f.write_str("closed"),
        }
    }
}

/// Errors surfaced by a bus link session.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The peer closed the stream at a packet boundary. Normal termination
    /// for a run loop.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The stream ended part-way through a packet.
    #[error("truncated packet: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    /// The packet bytes are inconsistent or carry an unknown discriminant.
    #[error("malformed packet: {0}")]
    Malformed(#[from] CodecError),

    /// A response arrived for a request id that is not the pending one.
    #[error("response for request {received} while waiting for request {expected}")]
    UnexpectedResponse { expected: u32, received: u32 },

    /// Any other protocol violation (unsolicited response, wrong response
    /// kind, out-of-role message).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer answered a request with a non-zero error code.
    #[error("peer rejected request with error code {code}")]
    Remote { code: u32 },

    /// A `TriggerEvent` carried a token this session never issued.
    #[error("unknown callback token {0:#x}")]
    InvalidCallback(u64),

    /// No handler is registered for the requested operation.
    #[error("no {0} handler registered")]
    CallbackMissing(&'static str),

    /// The operation requires a `Ready` session.
    #[error("session is {0}, operation requires ready")]
    NotReady(LinkState),

    /// Transport failure other than an orderly close.
    #[error("transport I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl LinkError {
    /// Maps an I/O error, folding peer-side disconnects into
    /// [`LinkError::ConnectionClosed`].
    pub fn from_io(error: std::io::Error) -> Self {
        match error.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => LinkError::ConnectionClosed,
            _ => LinkError::Io(error),
        }
    }

    /// Returns `true` when the error ends the session.
    ///
    /// Remote errors, unknown callback tokens, missing handlers and state
    /// checks leave the session usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            LinkError::Remote { .. }
                | LinkError::InvalidCallback(_)
                | LinkError::CallbackMissing(_)
                | LinkError::NotReady(_)
        )
    }

    /// Returns `true` for the protocol-violation family.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, LinkError::UnexpectedResponse { .. } | LinkError::Protocol(_))
    }
}
