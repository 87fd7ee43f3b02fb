//! Binary codec for bus link packets.
//!
//! Wire format:
//! ```text
//! event    : [total_size:4][outer_kind:1][event_kind:1][body]
//! request  : [total_size:4][outer_kind:1][request_kind:1][request_id:4][body]
//! response : [total_size:4][outer_kind:1][response_kind:1][request_id:4][body]
//! ```
//! `total_size` counts every byte of the packet including itself.
//! All multi-byte integers are little-endian.

use crate::protocol::messages::{
    CallbackToken, DeviceEndianness, Event, EventKind, IrqLevel, MemoryRegion, OuterKind, Packet,
    RegisterRequest, Request, RequestKind, Response, ResponseKind, SharedRegion, TargetEndianness,
    TimerEvent, MAX_DESCRIPTION_LEN, MAX_MEMORY_REGIONS, MAX_NAME_LEN, MAX_PACKET_SIZE,
    MAX_SHARED_NAME_LEN, MAX_SHARED_REGIONS, PREFIX_SIZE,
};
use thiserror::Error;

/// Errors that can occur while encoding or decoding a packet.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// A field extends past the end of the packet.
    #[error("insufficient data for {context}: need {needed} bytes, got {available}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        available: usize,
    },

    /// The outer discriminant is not a recognised value.
    #[error("unknown outer kind: {0}")]
    UnknownOuterKind(u8),

    /// The inner discriminant is not recognised for the given outer kind.
    #[error("unknown {outer:?} kind: {value}")]
    UnknownInnerKind { outer: OuterKind, value: u8 },

    /// An enumerated field holds a value outside its range.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u64 },

    /// A string or list exceeds its protocol limit.
    #[error("{field} is {len} long, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The declared `total_size` is outside `PREFIX_SIZE..=MAX_PACKET_SIZE`.
    #[error("declared packet size {0} is out of range")]
    InvalidSize(usize),

    /// The buffer holds fewer bytes than the declared `total_size`.
    #[error("packet declares {declared} bytes, only {available} available")]
    SizeMismatch { declared: usize, available: usize },

    /// The payload ended before `total_size` was consumed.
    #[error("{unread} trailing bytes after payload")]
    TrailingBytes { unread: usize },

    /// A string field is not valid UTF-8.
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Packet`] into its complete wire form, prefix included.
///
/// # Errors
///
/// Returns [`CodecError::FieldTooLong`] when a `Register` body exceeds the
/// protocol limits, or [`CodecError::InvalidSize`] when the packet would be
/// larger than [`MAX_PACKET_SIZE`].
///
/// # Examples
///
/// ```rust
/// use buslink_core::protocol::{decode_packet, encode_packet};
/// use buslink_core::protocol::messages::{Packet, Request};
///
/// let packet = Packet::Request { request_id: 3, request: Request::GetTime };
/// let bytes = encode_packet(&packet).unwrap();
/// let (decoded, consumed) = decode_packet(&bytes).unwrap();
/// assert_eq!(decoded, packet);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(64);

    // total_size is patched once the body length is known
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(packet.outer_kind() as u8);

    match packet {
        Packet::Event(event) => {
            buf.push(event.kind() as u8);
            encode_event(&mut buf, event);
        }
        Packet::Request {
            request_id,
            request,
        } => {
            buf.push(request.kind() as u8);
            buf.extend_from_slice(&request_id.to_le_bytes());
            encode_request(&mut buf, request)?;
        }
        Packet::Response {
            request_id,
            response,
        } => {
            buf.push(response.kind() as u8);
            buf.extend_from_slice(&request_id.to_le_bytes());
            encode_response(&mut buf, response);
        }
    }

    if buf.len() > MAX_PACKET_SIZE {
        return Err(CodecError::InvalidSize(buf.len()));
    }
    let total_size = buf.len() as u32;
    buf[0..4].copy_from_slice(&total_size.to_le_bytes());
    Ok(buf)
}

/// Reads the `total_size` field from an envelope prefix.
///
/// # Errors
///
/// Returns [`CodecError::InsufficientData`] if `prefix` is shorter than
/// [`PREFIX_SIZE`], or [`CodecError::InvalidSize`] if the declared size
/// cannot describe a valid packet.
pub fn declared_size(prefix: &[u8]) -> Result<usize, CodecError> {
    if prefix.len() < PREFIX_SIZE {
        return Err(CodecError::InsufficientData {
            context: "envelope prefix",
            needed: PREFIX_SIZE,
            available: prefix.len(),
        });
    }
    let total = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if !(PREFIX_SIZE..=MAX_PACKET_SIZE).contains(&total) {
        return Err(CodecError::InvalidSize(total));
    }
    Ok(total)
}

/// Decodes one [`Packet`] from the beginning of `bytes`.
///
/// Returns the packet and the number of bytes it occupied, which always
/// equals its declared `total_size`. Bytes after that are left untouched.
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are truncated, carry an unknown
/// discriminant, or do not consume exactly `total_size` bytes.
pub fn decode_packet(bytes: &[u8]) -> Result<(Packet, usize), CodecError> {
    let total = declared_size(bytes)?;
    if bytes.len() < total {
        return Err(CodecError::SizeMismatch {
            declared: total,
            available: bytes.len(),
        });
    }

    let outer_byte = bytes[4];
    let outer = OuterKind::try_from(outer_byte).map_err(|_| CodecError::UnknownOuterKind(outer_byte))?;

    let mut r = PayloadReader::new(&bytes[PREFIX_SIZE..total]);
    let inner = r.u8("inner kind")?;
    let packet = match outer {
        OuterKind::Event => {
            let kind = EventKind::try_from(inner)
                .map_err(|_| CodecError::UnknownInnerKind { outer, value: inner })?;
            Packet::Event(decode_event(kind, &mut r)?)
        }
        OuterKind::Request => {
            let kind = RequestKind::try_from(inner)
                .map_err(|_| CodecError::UnknownInnerKind { outer, value: inner })?;
            let request_id = r.u32("request id")?;
            Packet::Request {
                request_id,
                request: decode_request(kind, &mut r)?,
            }
        }
        OuterKind::Response => {
            let kind = ResponseKind::try_from(inner)
                .map_err(|_| CodecError::UnknownInnerKind { outer, value: inner })?;
            let request_id = r.u32("request id")?;
            Packet::Response {
                request_id,
                response: decode_response(kind, &mut r)?,
            }
        }
    };

    r.finish()?;
    Ok((packet, total))
}

// ── Body encoding ─────────────────────────────────────────────────────────────

fn encode_event(buf: &mut Vec<u8>, event: &Event) {
    match event {
        Event::Exit | Event::Shutdown => {}
        Event::SetIrq { line, level } => {
            buf.push(*line);
            buf.push(*level as u8);
        }
        Event::RegisterEvent(t) | Event::TriggerEvent(t) => encode_timer_event(buf, t),
    }
}

fn encode_timer_event(buf: &mut Vec<u8>, t: &TimerEvent) {
    buf.extend_from_slice(&t.expire_time.to_le_bytes());
    buf.extend_from_slice(&t.callback_token.0.to_le_bytes());
    buf.extend_from_slice(&t.event_id.to_le_bytes());
}

fn encode_request(buf: &mut Vec<u8>, request: &Request) -> Result<(), CodecError> {
    match request {
        Request::Read { address, length } => {
            buf.extend_from_slice(&address.to_le_bytes());
            buf.extend_from_slice(&length.to_le_bytes());
        }
        Request::Write { address, data } => {
            buf.extend_from_slice(&address.to_le_bytes());
            write_sized_bytes(buf, data);
        }
        Request::Register(r) => encode_register(buf, r)?,
        Request::Init | Request::Reset | Request::GetTime => {}
    }
    Ok(())
}

fn encode_register(buf: &mut Vec<u8>, r: &RegisterRequest) -> Result<(), CodecError> {
    check_len("memory_regions", r.memory_regions.len(), MAX_MEMORY_REGIONS)?;
    check_len("shared_regions", r.shared_regions.len(), MAX_SHARED_REGIONS)?;

    buf.extend_from_slice(&r.protocol_version.to_le_bytes());
    buf.extend_from_slice(&r.vendor_id.to_le_bytes());
    buf.extend_from_slice(&r.device_id.to_le_bytes());
    buf.push(r.endianness as u8);
    write_string(buf, "name", &r.name, MAX_NAME_LEN)?;
    write_string(buf, "description", &r.description, MAX_DESCRIPTION_LEN)?;

    buf.push(r.memory_regions.len() as u8);
    for region in &r.memory_regions {
        buf.extend_from_slice(&region.base.to_le_bytes());
        buf.extend_from_slice(&region.size.to_le_bytes());
    }

    buf.push(r.shared_regions.len() as u8);
    for region in &r.shared_regions {
        buf.extend_from_slice(&region.base.to_le_bytes());
        buf.extend_from_slice(&region.size.to_le_bytes());
        write_string(buf, "shared region name", &region.name, MAX_SHARED_NAME_LEN)?;
    }
    Ok(())
}

fn encode_response(buf: &mut Vec<u8>, response: &Response) {
    match response {
        Response::Error { code } => buf.extend_from_slice(&code.to_le_bytes()),
        Response::Data(data) => write_sized_bytes(buf, data),
        Response::Time(value) => buf.extend_from_slice(&value.to_le_bytes()),
        Response::Endianness(value) => buf.push(*value as u8),
    }
}

// ── Body decoding ─────────────────────────────────────────────────────────────

fn decode_event(kind: EventKind, r: &mut PayloadReader<'_>) -> Result<Event, CodecError> {
    Ok(match kind {
        EventKind::Exit => Event::Exit,
        EventKind::Shutdown => Event::Shutdown,
        EventKind::SetIrq => {
            let line = r.u8("SetIrq.line")?;
            let raw = r.u8("SetIrq.level")?;
            let level = IrqLevel::try_from(raw).map_err(|_| CodecError::InvalidValue {
                field: "SetIrq.level",
                value: u64::from(raw),
            })?;
            Event::SetIrq { line, level }
        }
        EventKind::RegisterEvent => Event::RegisterEvent(decode_timer_event(r)?),
        EventKind::TriggerEvent => Event::TriggerEvent(decode_timer_event(r)?),
    })
}

fn decode_timer_event(r: &mut PayloadReader<'_>) -> Result<TimerEvent, CodecError> {
    Ok(TimerEvent {
        expire_time: r.u64("TimerEvent.expire_time")?,
        callback_token: CallbackToken(r.u64("TimerEvent.callback_token")?),
        event_id: r.u32("TimerEvent.event_id")?,
    })
}

fn decode_request(kind: RequestKind, r: &mut PayloadReader<'_>) -> Result<Request, CodecError> {
    Ok(match kind {
        RequestKind::Read => Request::Read {
            address: r.u64("Read.address")?,
            length: r.u32("Read.length")?,
        },
        RequestKind::Write => {
            let address = r.u64("Write.address")?;
            let data = r.sized_bytes("Write.data")?;
            Request::Write { address, data }
        }
        RequestKind::Register => Request::Register(decode_register(r)?),
        RequestKind::Init => Request::Init,
        RequestKind::Reset => Request::Reset,
        RequestKind::GetTime => Request::GetTime,
    })
}

fn decode_register(r: &mut PayloadReader<'_>) -> Result<RegisterRequest, CodecError> {
    let protocol_version = r.u32("Register.protocol_version")?;
    let vendor_id = r.u32("Register.vendor_id")?;
    let device_id = r.u32("Register.device_id")?;
    let raw = r.u8("Register.endianness")?;
    let endianness = DeviceEndianness::try_from(raw).map_err(|_| CodecError::InvalidValue {
        field: "Register.endianness",
        value: u64::from(raw),
    })?;
    let name = r.string("name", MAX_NAME_LEN)?;
    let description = r.string("description", MAX_DESCRIPTION_LEN)?;

    let region_count = r.u8("Register.memory_region_count")? as usize;
    check_len("memory_regions", region_count, MAX_MEMORY_REGIONS)?;
    let mut memory_regions = Vec::with_capacity(region_count);
    for _ in 0..region_count {
        memory_regions.push(MemoryRegion {
            base: r.u64("MemoryRegion.base")?,
            size: r.u64("MemoryRegion.size")?,
        });
    }

    let shared_count = r.u8("Register.shared_region_count")? as usize;
    check_len("shared_regions", shared_count, MAX_SHARED_REGIONS)?;
    let mut shared_regions = Vec::with_capacity(shared_count);
    for _ in 0..shared_count {
        shared_regions.push(SharedRegion {
            base: r.u64("SharedRegion.base")?,
            size: r.u64("SharedRegion.size")?,
            name: r.string("shared region name", MAX_SHARED_NAME_LEN)?,
        });
    }

    Ok(RegisterRequest {
        protocol_version,
        vendor_id,
        device_id,
        endianness,
        name,
        description,
        memory_regions,
        shared_regions,
    })
}

fn decode_response(kind: ResponseKind, r: &mut PayloadReader<'_>) -> Result<Response, CodecError> {
    Ok(match kind {
        ResponseKind::Error => Response::Error {
            code: r.u32("Error.code")?,
        },
        ResponseKind::Data => Response::Data(r.sized_bytes("Data.data")?),
        ResponseKind::Time => Response::Time(r.u64("Time.value")?),
        ResponseKind::Endianness => {
            let raw = r.u8("Endianness.value")?;
            let value = TargetEndianness::try_from(raw).map_err(|_| CodecError::InvalidValue {
                field: "Endianness.value",
                value: u64::from(raw),
            })?;
            Response::Endianness(value)
        }
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), CodecError> {
    if len > max {
        Err(CodecError::FieldTooLong { field, len, max })
    } else {
        Ok(())
    }
}

/// Writes a 4-byte length followed by the bytes.
fn write_sized_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_string(
    buf: &mut Vec<u8>,
    field: &'static str,
    s: &str,
    max: usize,
) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    check_len(field, bytes.len(), max)?;
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Bounds-checked cursor over a packet body.
///
/// Every length read from the wire is validated against the bytes actually
/// present before it is used to slice.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, context: &'static str, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(CodecError::InsufficientData {
                context,
                needed: n,
                available: remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(context, N)?);
        Ok(out)
    }

    fn u8(&mut self, context: &'static str) -> Result<u8, CodecError> {
        Ok(self.array::<1>(context)?[0])
    }

    fn u16(&mut self, context: &'static str) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array(context)?))
    }

    fn u32(&mut self, context: &'static str) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array(context)?))
    }

    fn u64(&mut self, context: &'static str) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array(context)?))
    }

    fn sized_bytes(&mut self, context: &'static str) -> Result<Vec<u8>, CodecError> {
        let len = self.u32(context)? as usize;
        Ok(self.take(context, len)?.to_vec())
    }

    fn string(&mut self, field: &'static str, max: usize) -> Result<String, CodecError> {
        let len = self.u16(field)? as usize;
        check_len(field, len, max)?;
        let bytes = self.take(field, len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8(field))
    }

    fn finish(self) -> Result<(), CodecError> {
        let unread = self.buf.len() - self.pos;
        if unread == 0 {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes { unread })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::PROTOCOL_VERSION;

    fn round_trip(packet: &Packet) -> Packet {
        let encoded = encode_packet(packet).expect("encode failed");
        let (decoded, consumed) = decode_packet(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        decoded
    }

    fn sample_register() -> RegisterRequest {
        RegisterRequest {
            protocol_version: PROTOCOL_VERSION,
            vendor_id: 0x1AF4,
            device_id: 0x0042,
            endianness: DeviceEndianness::Little,
            name: "scratch".to_string(),
            description: "scratch register block".to_string(),
            memory_regions: vec![MemoryRegion { base: 0x1000, size: 0x10 }],
            shared_regions: vec![SharedRegion {
                base: 0x8000_0000,
                size: 0x1000,
                name: "ring".to_string(),
            }],
        }
    }

    // ── Layout ───────────────────────────────────────────────────────────────

    #[test]
    fn test_total_size_includes_prefix() {
        // Arrange
        let packet = Packet::Event(Event::Exit);

        // Act
        let bytes = encode_packet(&packet).unwrap();

        // Assert – prefix (5) + event kind (1)
        assert_eq!(bytes.len(), 6);
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 6);
        assert_eq!(bytes[4], OuterKind::Event as u8);
        assert_eq!(bytes[5], EventKind::Exit as u8);
    }

    #[test]
    fn test_request_layout_is_little_endian() {
        let packet = Packet::Request {
            request_id: 0x0102_0304,
            request: Request::Read { address: 0x1000, length: 4 },
        };
        let bytes = encode_packet(&packet).unwrap();

        // 5 prefix + 1 kind + 4 id + 8 address + 4 length
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[6..10], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[10..18], &0x1000u64.to_le_bytes());
        assert_eq!(&bytes[18..22], &4u32.to_le_bytes());
    }

    #[test]
    fn test_pulse_is_single_wire_value() {
        let bytes = encode_packet(&Packet::Event(Event::SetIrq {
            line: 3,
            level: IrqLevel::Pulse,
        }))
        .unwrap();
        assert_eq!(&bytes[5..], &[EventKind::SetIrq as u8, 3, 2]);
    }

    // ── Round trips ──────────────────────────────────────────────────────────

    #[test]
    fn test_register_round_trip() {
        let packet = Packet::Request {
            request_id: 0,
            request: Request::Register(sample_register()),
        };
        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn test_register_with_max_regions_round_trip() {
        let mut register = sample_register();
        register.name = "n".repeat(MAX_NAME_LEN);
        register.description = "d".repeat(MAX_DESCRIPTION_LEN);
        register.memory_regions = (0..MAX_MEMORY_REGIONS as u64)
            .map(|i| MemoryRegion { base: i * 0x100, size: 0x100 })
            .collect();
        let packet = Packet::Request { request_id: 9, request: Request::Register(register) };
        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn test_write_with_trailing_data_round_trip() {
        let packet = Packet::Request {
            request_id: 11,
            request: Request::Write { address: 0x1004, data: vec![1, 2, 3, 4] },
        };
        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn test_timer_event_round_trip_preserves_token() {
        let packet = Packet::Event(Event::TriggerEvent(TimerEvent {
            expire_time: 1_000_000,
            callback_token: CallbackToken(0xFFFF_8000_DEAD_BEEF),
            event_id: 7,
        }));
        assert_eq!(round_trip(&packet), packet);
    }

    #[test]
    fn test_responses_round_trip() {
        for response in [
            Response::ok(),
            Response::Error { code: 0xFFFF_FFFF },
            Response::Data(vec![0x2A, 0, 0, 0]),
            Response::Data(Vec::new()),
            Response::Time(u64::MAX),
            Response::Endianness(TargetEndianness::Big),
        ] {
            let packet = Packet::Response { request_id: 5, response };
            assert_eq!(round_trip(&packet), packet);
        }
    }

    // ── Encode limits ────────────────────────────────────────────────────────

    #[test]
    fn test_encode_rejects_long_name() {
        let mut register = sample_register();
        register.name = "x".repeat(MAX_NAME_LEN + 1);
        let result = encode_packet(&Packet::Request {
            request_id: 0,
            request: Request::Register(register),
        });
        assert_eq!(
            result,
            Err(CodecError::FieldTooLong { field: "name", len: 64, max: 63 })
        );
    }

    #[test]
    fn test_encode_rejects_too_many_shared_regions() {
        let mut register = sample_register();
        register.shared_regions.push(register.shared_regions[0].clone());
        let result = encode_packet(&Packet::Request {
            request_id: 0,
            request: Request::Register(register),
        });
        assert!(matches!(result, Err(CodecError::FieldTooLong { field: "shared_regions", .. })));
    }

    // ── Decode errors ────────────────────────────────────────────────────────

    #[test]
    fn test_decode_short_prefix_is_insufficient_data() {
        let result = decode_packet(&[6, 0, 0]);
        assert!(matches!(result, Err(CodecError::InsufficientData { needed: 5, available: 3, .. })));
    }

    #[test]
    fn test_decode_rejects_size_below_prefix() {
        let result = decode_packet(&[4, 0, 0, 0, 0, 0]);
        assert_eq!(result, Err(CodecError::InvalidSize(4)));
    }

    #[test]
    fn test_decode_rejects_buffer_shorter_than_declared() {
        let mut bytes = encode_packet(&Packet::Event(Event::Exit)).unwrap();
        bytes[0] = 7;
        assert_eq!(
            decode_packet(&bytes),
            Err(CodecError::SizeMismatch { declared: 7, available: 6 })
        );
    }

    #[test]
    fn test_decode_unknown_outer_kind() {
        let bytes = [6, 0, 0, 0, 9, 0];
        assert_eq!(decode_packet(&bytes), Err(CodecError::UnknownOuterKind(9)));
    }

    #[test]
    fn test_decode_unknown_inner_kind() {
        let bytes = [6, 0, 0, 0, OuterKind::Event as u8, 0x77];
        assert_eq!(
            decode_packet(&bytes),
            Err(CodecError::UnknownInnerKind { outer: OuterKind::Event, value: 0x77 })
        );
    }

    #[test]
    fn test_decode_invalid_irq_level() {
        let bytes = [8, 0, 0, 0, OuterKind::Event as u8, EventKind::SetIrq as u8, 1, 3];
        assert!(matches!(
            decode_packet(&bytes),
            Err(CodecError::InvalidValue { field: "SetIrq.level", value: 3 })
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes_inside_declared_size() {
        // Exit event padded with one extra byte that total_size claims
        let bytes = [7, 0, 0, 0, OuterKind::Event as u8, EventKind::Exit as u8, 0xAA];
        assert_eq!(decode_packet(&bytes), Err(CodecError::TrailingBytes { unread: 1 }));
    }

    #[test]
    fn test_decode_write_length_beyond_packet_is_rejected() {
        // Write claims 200 data bytes but the packet only has 2
        let mut bytes = encode_packet(&Packet::Request {
            request_id: 1,
            request: Request::Write { address: 0, data: vec![1, 2] },
        })
        .unwrap();
        let len_offset = 5 + 1 + 4 + 8;
        bytes[len_offset..len_offset + 4].copy_from_slice(&200u32.to_le_bytes());
        assert!(matches!(
            decode_packet(&bytes),
            Err(CodecError::InsufficientData { context: "Write.data", needed: 200, available: 2 })
        ));
    }

    #[test]
    fn test_decode_leaves_following_packet_untouched() {
        // Arrange – two packets back to back
        let first = encode_packet(&Packet::Event(Event::Shutdown)).unwrap();
        let second = encode_packet(&Packet::Response {
            request_id: 2,
            response: Response::Time(99),
        })
        .unwrap();
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        // Act
        let (packet, consumed) = decode_packet(&stream).unwrap();

        // Assert
        assert_eq!(packet, Packet::Event(Event::Shutdown));
        assert_eq!(consumed, first.len());
        let (next, _) = decode_packet(&stream[consumed..]).unwrap();
        assert_eq!(next, Packet::Response { request_id: 2, response: Response::Time(99) });
    }
}
