//! Stream framing: reading and writing whole packets on a byte stream.
//!
//! Reading is two-phase. The 5-byte prefix is read first; its `total_size`
//! is the sole authority for how many more bytes belong to the packet. Both
//! phases loop over partial reads, so a packet delivered one byte per `read`
//! call decodes exactly like one delivered in a single chunk, and no byte
//! beyond `total_size` is ever consumed from the stream.

use std::io::{ErrorKind, Read, Write};

use tracing::trace;

use crate::link::LinkError;
use crate::protocol::codec::{decode_packet, declared_size, encode_packet};
use crate::protocol::messages::{Packet, PREFIX_SIZE};

/// Reads one complete packet from `reader`.
///
/// # Errors
///
/// - [`LinkError::ConnectionClosed`] if the stream ends before the first byte.
/// - [`LinkError::Truncated`] if it ends part-way through the packet.
/// - [`LinkError::Malformed`] if the bytes do not form a valid packet.
/// - [`LinkError::Io`] for any other transport failure.
pub fn read_packet<R: Read + ?Sized>(reader: &mut R) -> Result<Packet, LinkError> {
    let mut buf = vec![0u8; PREFIX_SIZE];
    let got = fill(reader, &mut buf)?;
    if got == 0 {
        return Err(LinkError::ConnectionClosed);
    }
    if got < PREFIX_SIZE {
        return Err(LinkError::Truncated {
            expected: PREFIX_SIZE,
            received: got,
        });
    }

    let total = declared_size(&buf)?;
    buf.resize(total, 0);
    let got = fill(reader, &mut buf[PREFIX_SIZE..])?;
    if PREFIX_SIZE + got < total {
        return Err(LinkError::Truncated {
            expected: total,
            received: PREFIX_SIZE + got,
        });
    }

    let (packet, _) = decode_packet(&buf)?;
    trace!(total, "read packet");
    Ok(packet)
}

/// Encodes `packet` and writes all of it to `writer`, then flushes.
///
/// # Errors
///
/// Returns [`LinkError::Malformed`] if the packet cannot be encoded (nothing
/// is written in that case) or a transport error if the write fails.
pub fn write_packet<W: Write + ?Sized>(writer: &mut W, packet: &Packet) -> Result<(), LinkError> {
    let bytes = encode_packet(packet)?;
    writer.write_all(&bytes).map_err(LinkError::from_io)?;
    writer.flush().map_err(LinkError::from_io)?;
    trace!(total = bytes.len(), "wrote packet");
    Ok(())
}

/// Reads until `buf` is full or the stream reports end-of-file.
///
/// Returns how many bytes were read; fewer than `buf.len()` means EOF.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize, LinkError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(LinkError::from_io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::TrickleReader;
    use crate::protocol::messages::{Event, Request, Response};
    use std::io::Cursor;

    fn encoded(packet: &Packet) -> Vec<u8> {
        encode_packet(packet).unwrap()
    }

    #[test]
    fn test_read_packet_from_single_chunk() {
        let packet = Packet::Response { request_id: 1, response: Response::Time(42) };
        let mut reader = Cursor::new(encoded(&packet));

        assert_eq!(read_packet(&mut reader).unwrap(), packet);
    }

    #[test]
    fn test_read_packet_one_byte_at_a_time() {
        // Arrange
        let packet = Packet::Request {
            request_id: 3,
            request: Request::Write { address: 0x1000, data: vec![9, 8, 7, 6] },
        };
        let bytes = encoded(&packet);
        let mut reader = TrickleReader::new(bytes.clone());

        // Act
        let decoded = read_packet(&mut reader).unwrap();

        // Assert – one read call per byte, never more
        assert_eq!(decoded, packet);
        assert_eq!(reader.reads(), bytes.len());
        assert_eq!(reader.position(), bytes.len());
    }

    #[test]
    fn test_read_packet_never_reads_past_total_size() {
        // Arrange – a packet followed by the start of another one
        let first = encoded(&Packet::Event(Event::Exit));
        let mut stream = first.clone();
        stream.extend_from_slice(&[0xEE; 16]);
        let mut reader = TrickleReader::new(stream);

        // Act
        read_packet(&mut reader).unwrap();

        // Assert
        assert_eq!(reader.position(), first.len(), "bytes after total_size must stay unread");
    }

    #[test]
    fn test_read_packet_on_empty_stream_is_connection_closed() {
        let mut reader = Cursor::new(Vec::new());
        assert!(matches!(read_packet(&mut reader), Err(LinkError::ConnectionClosed)));
    }

    #[test]
    fn test_read_packet_with_partial_prefix_is_truncated() {
        let mut reader = Cursor::new(vec![10, 0]);
        assert!(matches!(
            read_packet(&mut reader),
            Err(LinkError::Truncated { expected: 5, received: 2 })
        ));
    }

    #[test]
    fn test_read_packet_with_partial_body_is_truncated() {
        let bytes = encoded(&Packet::Response { request_id: 1, response: Response::Time(1) });
        let cut = bytes.len() - 3;
        let mut reader = TrickleReader::new(bytes[..cut].to_vec());

        match read_packet(&mut reader) {
            Err(LinkError::Truncated { expected, received }) => {
                assert_eq!(expected, bytes.len());
                assert_eq!(received, cut);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_read_packet_rejects_oversized_declaration() {
        let mut reader = Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF, 0]);
        assert!(matches!(read_packet(&mut reader), Err(LinkError::Malformed(_))));
    }

    #[test]
    fn test_write_packet_writes_whole_encoding() {
        let packet = Packet::Event(Event::Shutdown);
        let mut out = Vec::new();

        write_packet(&mut out, &packet).unwrap();

        assert_eq!(out, encoded(&packet));
    }
}
