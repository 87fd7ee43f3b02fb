//! In-memory transports for exercising sessions without sockets.
//!
//! # Usage in tests
//!
//! ```
//! use buslink_core::link::mock::ScriptedStream;
//! use buslink_core::link::Channel;
//! use buslink_core::protocol::messages::{Packet, Response};
//!
//! let mut stream = ScriptedStream::new();
//! stream.push_packet(&Packet::Response { request_id: 0, response: Response::ok() });
//!
//! let mut channel = Channel::new(stream);
//! let packet = channel.recv().unwrap();
//! assert!(matches!(packet, Packet::Response { request_id: 0, .. }));
//! ```

use std::io::{self, Read, Write};

use crate::protocol::codec::{decode_packet, encode_packet};
use crate::protocol::messages::Packet;

/// A duplex stream whose inbound bytes are scripted up front and whose
/// outbound bytes are captured for inspection.
///
/// Once the script is exhausted, reads return end-of-file, which a session
/// sees as the peer closing the connection.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    inbound: Vec<u8>,
    position: usize,
    outbound: Vec<u8>,
    /// Upper bound on bytes returned per `read` call; `None` means unbounded.
    max_read: Option<usize>,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stream that hands out at most `max_read` bytes per `read`.
    pub fn with_max_read(max_read: usize) -> Self {
        Self {
            max_read: Some(max_read.max(1)),
            ..Self::default()
        }
    }

    /// Appends the encoding of `packet` to the inbound script.
    ///
    /// # Panics
    ///
    /// Panics if the packet cannot be encoded; scripts are test fixtures.
    pub fn push_packet(&mut self, packet: &Packet) {
        let bytes = encode_packet(packet).expect("scripted packet must encode");
        self.inbound.extend_from_slice(&bytes);
    }

    /// Appends raw bytes to the inbound script.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
    }

    /// Total scripted inbound bytes.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Inbound bytes not yet read.
    pub fn unread(&self) -> usize {
        self.inbound.len() - self.position
    }

    /// Raw bytes written so far.
    pub fn sent_bytes(&self) -> &[u8] {
        &self.outbound
    }

    /// Decodes every packet written so far.
    ///
    /// # Panics
    ///
    /// Panics if the outbound bytes do not decode cleanly.
    pub fn sent_packets(&self) -> Vec<Packet> {
        let mut packets = Vec::new();
        let mut offset = 0;
        while offset < self.outbound.len() {
            let (packet, consumed) =
                decode_packet(&self.outbound[offset..]).expect("outbound bytes must decode");
            packets.push(packet);
            offset += consumed;
        }
        packets
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.inbound[self.position..];
        let mut n = remaining.len().min(buf.len());
        if let Some(max) = self.max_read {
            n = n.min(max);
        }
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A reader that returns exactly one byte per `read` call and counts calls.
#[derive(Debug)]
pub struct TrickleReader {
    data: Vec<u8>,
    position: usize,
    reads: usize,
}

impl TrickleReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            reads: 0,
        }
    }

    /// Number of `read` calls that returned data.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Read for TrickleReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.data.len() {
            return Ok(0);
        }
        buf[0] = self.data[self.position];
        self.position += 1;
        self.reads += 1;
        Ok(1)
    }
}
