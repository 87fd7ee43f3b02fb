//! Integration tests for the buslink-core codec and framing.
//!
//! These tests drive the public API only: every payload variant is encoded
//! and decoded back, and whole streams of packets are pushed through the
//! framing loop with adversarial chunking.

use buslink_core::link::mock::{ScriptedStream, TrickleReader};
use buslink_core::protocol::frame::read_packet;
use buslink_core::protocol::messages::{
    CallbackToken, DeviceEndianness, Event, IrqLevel, MemoryRegion, Packet, RegisterRequest,
    Request, Response, SharedRegion, TargetEndianness, TimerEvent, PREFIX_SIZE, PROTOCOL_VERSION,
};
use buslink_core::{decode_packet, encode_packet, Channel, LinkError};

fn timer(token: u64) -> TimerEvent {
    TimerEvent {
        expire_time: 1_000_000,
        callback_token: CallbackToken(token),
        event_id: 9,
    }
}

fn register_request() -> RegisterRequest {
    RegisterRequest {
        protocol_version: PROTOCOL_VERSION,
        vendor_id: 0x1AF4,
        device_id: 0x0042,
        endianness: DeviceEndianness::Little,
        name: "scratch".to_string(),
        description: "scratch register bank".to_string(),
        memory_regions: vec![
            MemoryRegion { base: 0x1000, size: 0x10 },
            MemoryRegion { base: 0x2000, size: 0x100 },
        ],
        shared_regions: vec![SharedRegion {
            base: 0x8000_0000,
            size: 0x1000,
            name: "framebuffer".to_string(),
        }],
    }
}

/// One packet of every wire variant.
fn every_variant() -> Vec<Packet> {
    vec![
        Packet::Event(Event::Exit),
        Packet::Event(Event::SetIrq { line: 0, level: IrqLevel::Low }),
        Packet::Event(Event::SetIrq { line: 7, level: IrqLevel::High }),
        Packet::Event(Event::SetIrq { line: 255, level: IrqLevel::Pulse }),
        Packet::Event(Event::RegisterEvent(timer(1))),
        Packet::Event(Event::TriggerEvent(timer(u64::MAX))),
        Packet::Event(Event::Shutdown),
        Packet::Request { request_id: 0, request: Request::Read { address: 0x1000, length: 4 } },
        Packet::Request {
            request_id: 1,
            request: Request::Write { address: u64::MAX, data: vec![1, 2, 3, 4] },
        },
        Packet::Request { request_id: 2, request: Request::Write { address: 0, data: vec![] } },
        Packet::Request { request_id: 3, request: Request::Register(register_request()) },
        Packet::Request { request_id: 4, request: Request::Init },
        Packet::Request { request_id: 5, request: Request::Reset },
        Packet::Request { request_id: u32::MAX, request: Request::GetTime },
        Packet::Response { request_id: 0, response: Response::ok() },
        Packet::Response { request_id: 1, response: Response::Error { code: 0xDEAD } },
        Packet::Response { request_id: 2, response: Response::Data(vec![0x2A, 0, 0, 0]) },
        Packet::Response { request_id: 3, response: Response::Time(u64::MAX) },
        Packet::Response {
            request_id: 4,
            response: Response::Endianness(TargetEndianness::Big),
        },
    ]
}

#[test]
fn test_every_variant_survives_encode_decode() {
    for packet in every_variant() {
        let bytes = encode_packet(&packet).expect("encode must succeed");
        let (decoded, consumed) = decode_packet(&bytes).expect("decode must succeed");

        assert_eq!(consumed, bytes.len(), "all bytes must be consumed for {packet:?}");
        assert_eq!(decoded, packet);
    }
}

#[test]
fn test_total_size_matches_encoded_length() {
    for packet in every_variant() {
        let bytes = encode_packet(&packet).unwrap();
        let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(declared, bytes.len());
        assert!(declared > PREFIX_SIZE);
    }
}

#[test]
fn test_back_to_back_packets_frame_one_byte_at_a_time() {
    // Arrange
    let packets = every_variant();
    let mut stream = Vec::new();
    for packet in &packets {
        stream.extend_from_slice(&encode_packet(packet).unwrap());
    }
    let total = stream.len();
    let mut reader = TrickleReader::new(stream);

    // Act
    let mut decoded = Vec::new();
    loop {
        match read_packet(&mut reader) {
            Ok(packet) => decoded.push(packet),
            Err(LinkError::ConnectionClosed) => break,
            Err(e) => panic!("unexpected framing error: {e}"),
        }
    }

    // Assert
    assert_eq!(decoded, packets);
    assert_eq!(reader.reads(), total, "exactly one read per byte");
}

#[test]
fn test_channel_reads_through_small_chunks() {
    // Arrange – three bytes per read splits every prefix
    let mut stream = ScriptedStream::with_max_read(3);
    for packet in every_variant() {
        stream.push_packet(&packet);
    }
    let mut channel = Channel::new(stream);

    // Act
    let mut count = 0;
    while channel.recv().is_ok() {
        count += 1;
    }

    // Assert
    assert_eq!(count, every_variant().len());
    assert_eq!(channel.get_ref().unread(), 0);
}

#[test]
fn test_corrupted_inner_kind_is_malformed_not_panic() {
    let mut bytes = encode_packet(&Packet::Request { request_id: 1, request: Request::Init }).unwrap();
    bytes[PREFIX_SIZE] = 0xEE;

    let result = read_packet(&mut bytes.as_slice());

    assert!(matches!(result, Err(LinkError::Malformed(_))));
}

#[test]
fn test_declared_length_beyond_input_is_truncated() {
    // Arrange – claim a 4-byte write but ship only two data bytes
    let mut bytes = encode_packet(&Packet::Request {
        request_id: 1,
        request: Request::Write { address: 0x10, data: vec![1, 2, 3, 4] },
    })
    .unwrap();
    bytes.truncate(bytes.len() - 2);

    // Act
    let result = read_packet(&mut bytes.as_slice());

    // Assert
    assert!(matches!(result, Err(LinkError::Truncated { .. })));
}
