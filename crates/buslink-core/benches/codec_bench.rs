//! Criterion benchmarks for the bus link packet codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package buslink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use buslink_core::link::mock::ScriptedStream;
use buslink_core::protocol::codec::{decode_packet, encode_packet};
use buslink_core::protocol::frame::read_packet;
use buslink_core::protocol::messages::{
    CallbackToken, DeviceEndianness, Event, IrqLevel, MemoryRegion, Packet, RegisterRequest,
    Request, Response, TimerEvent, PROTOCOL_VERSION,
};

// ── Packet fixtures ───────────────────────────────────────────────────────────

fn make_set_irq() -> Packet {
    Packet::Event(Event::SetIrq { line: 3, level: IrqLevel::Pulse })
}

fn make_trigger() -> Packet {
    Packet::Event(Event::TriggerEvent(TimerEvent {
        expire_time: 123_456_789,
        callback_token: CallbackToken(17),
        event_id: 2,
    }))
}

fn make_read() -> Packet {
    Packet::Request { request_id: 11, request: Request::Read { address: 0x1000, length: 4 } }
}

fn make_write() -> Packet {
    Packet::Request {
        request_id: 12,
        request: Request::Write { address: 0x1004, data: vec![0xDE, 0xAD, 0xBE, 0xEF] },
    }
}

fn make_data() -> Packet {
    Packet::Response { request_id: 11, response: Response::Data(vec![0x2A, 0, 0, 0]) }
}

fn make_register() -> Packet {
    Packet::Request {
        request_id: 0,
        request: Request::Register(RegisterRequest {
            protocol_version: PROTOCOL_VERSION,
            vendor_id: 0x1AF4,
            device_id: 0x0001,
            endianness: DeviceEndianness::Little,
            name: "bench-device".to_string(),
            description: "device used for codec benchmarks".to_string(),
            memory_regions: (0..32)
                .map(|i| MemoryRegion { base: 0x1000 * (i + 1), size: 0x100 })
                .collect(),
            shared_regions: Vec::new(),
        }),
    }
}

fn fixtures() -> Vec<(&'static str, Packet)> {
    vec![
        ("SetIrq", make_set_irq()),
        ("TriggerEvent", make_trigger()),
        ("Read", make_read()),
        ("Write", make_write()),
        ("Data", make_data()),
        ("Register(32 regions)", make_register()),
    ]
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_packet");
    for (name, packet) in fixtures() {
        group.bench_with_input(BenchmarkId::new("packet", name), &packet, |b, packet| {
            b.iter(|| encode_packet(black_box(packet)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_packet");
    for (name, packet) in fixtures() {
        let bytes = encode_packet(&packet).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("packet", name), &bytes, |b, bytes| {
            b.iter(|| decode_packet(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// MMIO read round trip as framed off a stream delivering 7-byte chunks.
fn bench_framed_mmio_read(c: &mut Criterion) {
    c.bench_function("framed_read_then_data", |b| {
        b.iter(|| {
            let mut stream = ScriptedStream::with_max_read(7);
            stream.push_packet(&make_read());
            stream.push_packet(&make_data());
            let first = read_packet(black_box(&mut stream)).unwrap();
            let second = read_packet(black_box(&mut stream)).unwrap();
            (first, second)
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_framed_mmio_read);
criterion_main!(benches);
