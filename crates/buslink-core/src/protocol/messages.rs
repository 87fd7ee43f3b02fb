//! All bus link packet types.
//!
//! A packet is a two-level discriminated union: the outer kind (event,
//! request, response) selects which inner enum the next byte belongs to.
//! The Rust model mirrors that directly, so a [`Packet`] can never carry an
//! inner discriminant that is meaningless for its outer kind.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol version advertised in `Register` requests.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size of the envelope prefix: `total_size` (4) + `outer_kind` (1).
pub const PREFIX_SIZE: usize = 5;

/// Upper bound accepted for `total_size`. Larger values are treated as malformed.
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Maximum device name length in bytes.
pub const MAX_NAME_LEN: usize = 63;

/// Maximum device description length in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Maximum shared-region name length in bytes.
pub const MAX_SHARED_NAME_LEN: usize = 255;

/// Maximum number of MMIO regions a device may register.
pub const MAX_MEMORY_REGIONS: usize = 32;

/// Maximum number of shared-memory regions a device may register.
pub const MAX_SHARED_REGIONS: usize = 1;

/// Largest single `Write` payload and largest register access, in bytes.
pub const MAX_ACCESS_SIZE: usize = 4;

/// `Error` response code meaning success.
pub const ERROR_OK: u32 = 0;

/// `Error` response code meaning the request failed.
pub const ERROR_FAILED: u32 = 1;

// ── Discriminants ─────────────────────────────────────────────────────────────

/// Outer discriminant carried in the envelope prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OuterKind {
    Event = 0,
    Request = 1,
    Response = 2,
}

impl TryFrom<u8> for OuterKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OuterKind::Event),
            1 => Ok(OuterKind::Request),
            2 => Ok(OuterKind::Response),
            _ => Err(()),
        }
    }
}

/// Inner discriminant of an event packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Exit = 0,
    SetIrq = 1,
    RegisterEvent = 2,
    TriggerEvent = 3,
    Shutdown = 4,
}

impl TryFrom<u8> for EventKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventKind::Exit),
            1 => Ok(EventKind::SetIrq),
            2 => Ok(EventKind::RegisterEvent),
            3 => Ok(EventKind::TriggerEvent),
            4 => Ok(EventKind::Shutdown),
            _ => Err(()),
        }
    }
}

/// Inner discriminant of a request packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestKind {
    Read = 0,
    Write = 1,
    Register = 2,
    Init = 3,
    Reset = 4,
    GetTime = 5,
}

impl TryFrom<u8> for RequestKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RequestKind::Read),
            1 => Ok(RequestKind::Write),
            2 => Ok(RequestKind::Register),
            3 => Ok(RequestKind::Init),
            4 => Ok(RequestKind::Reset),
            5 => Ok(RequestKind::GetTime),
            _ => Err(()),
        }
    }
}

/// Inner discriminant of a response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseKind {
    Error = 0,
    Data = 1,
    Time = 2,
    Endianness = 3,
}

impl TryFrom<u8> for ResponseKind {
    type Error = ();

    // `Self::Error` would be ambiguous with the `Error` variant.
    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ResponseKind::Error),
            1 => Ok(ResponseKind::Data),
            2 => Ok(ResponseKind::Time),
            3 => Ok(ResponseKind::Endianness),
            _ => Err(()),
        }
    }
}

// ── Descriptive field enums ───────────────────────────────────────────────────

/// Level carried by a `SetIrq` event.
///
/// `Pulse` is a single wire value: a pulse is never sent as a raise followed
/// by a lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum IrqLevel {
    Low = 0,
    High = 1,
    Pulse = 2,
}

impl TryFrom<u8> for IrqLevel {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(IrqLevel::Low),
            1 => Ok(IrqLevel::High),
            2 => Ok(IrqLevel::Pulse),
            _ => Err(()),
        }
    }
}

/// Byte order of the device's registers, as declared at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DeviceEndianness {
    #[default]
    Native = 0,
    Big = 1,
    Little = 2,
}

impl TryFrom<u8> for DeviceEndianness {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceEndianness::Native),
            1 => Ok(DeviceEndianness::Big),
            2 => Ok(DeviceEndianness::Little),
            _ => Err(()),
        }
    }
}

/// Byte order of the emulated target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TargetEndianness {
    #[default]
    Little = 0,
    Big = 1,
}

impl TryFrom<u8> for TargetEndianness {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TargetEndianness::Little),
            1 => Ok(TargetEndianness::Big),
            _ => Err(()),
        }
    }
}

// ── Payload structs ───────────────────────────────────────────────────────────

/// Opaque value identifying a scheduled callback.
///
/// Minted by the side that registers the event and echoed back unmodified
/// by the peer. The peer must never interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackToken(pub u64);

/// Body shared by `RegisterEvent` and `TriggerEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    /// Virtual time at which the event should fire.
    pub expire_time: u64,
    /// Sender-owned token, echoed back in the matching `TriggerEvent`.
    pub callback_token: CallbackToken,
    /// Caller-chosen identifier passed through to the callback.
    pub event_id: u32,
}

/// An MMIO region claimed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
}

impl MemoryRegion {
    /// Returns `true` when `[address, address + length)` lies inside the region.
    pub fn contains(&self, address: u64, length: u64) -> bool {
        let Some(end) = address.checked_add(length) else {
            return false;
        };
        address >= self.base && end <= self.base.saturating_add(self.size)
    }

    /// Returns `true` when the two regions share at least one byte.
    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        let self_end = self.base.saturating_add(self.size);
        let other_end = other.base.saturating_add(other.size);
        self.base < other_end && other.base < self_end
    }
}

/// A named shared-memory region claimed by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedRegion {
    pub base: u64,
    pub size: u64,
    pub name: String,
}

/// Body of a `Register` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub protocol_version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub endianness: DeviceEndianness,
    /// At most [`MAX_NAME_LEN`] bytes.
    pub name: String,
    /// At most [`MAX_DESCRIPTION_LEN`] bytes.
    pub description: String,
    /// At most [`MAX_MEMORY_REGIONS`] entries.
    pub memory_regions: Vec<MemoryRegion>,
    /// At most [`MAX_SHARED_REGIONS`] entries.
    pub shared_regions: Vec<SharedRegion>,
}

// ── Top-level packet ──────────────────────────────────────────────────────────

/// Fire-and-forget messages. Events never receive a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Exit,
    SetIrq { line: u8, level: IrqLevel },
    RegisterEvent(TimerEvent),
    TriggerEvent(TimerEvent),
    Shutdown,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Exit => EventKind::Exit,
            Event::SetIrq { .. } => EventKind::SetIrq,
            Event::RegisterEvent(_) => EventKind::RegisterEvent,
            Event::TriggerEvent(_) => EventKind::TriggerEvent,
            Event::Shutdown => EventKind::Shutdown,
        }
    }
}

/// Messages that expect exactly one [`Response`] with the same request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Read { address: u64, length: u32 },
    /// The wire `length` field is `data.len()`.
    Write { address: u64, data: Vec<u8> },
    Register(RegisterRequest),
    Init,
    Reset,
    GetTime,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Read { .. } => RequestKind::Read,
            Request::Write { .. } => RequestKind::Write,
            Request::Register(_) => RequestKind::Register,
            Request::Init => RequestKind::Init,
            Request::Reset => RequestKind::Reset,
            Request::GetTime => RequestKind::GetTime,
        }
    }
}

/// Replies to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `code == 0` is success.
    Error { code: u32 },
    /// The wire `length` field is the vector length.
    Data(Vec<u8>),
    Time(u64),
    Endianness(TargetEndianness),
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Error { .. } => ResponseKind::Error,
            Response::Data(_) => ResponseKind::Data,
            Response::Time(_) => ResponseKind::Time,
            Response::Endianness(_) => ResponseKind::Endianness,
        }
    }

    /// Shorthand for `Error { code: 0 }`.
    pub fn ok() -> Self {
        Response::Error { code: ERROR_OK }
    }

    /// Shorthand for `Error { code: 1 }`.
    pub fn failed() -> Self {
        Response::Error { code: ERROR_FAILED }
    }
}

/// A complete decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Event(Event),
    Request { request_id: u32, request: Request },
    Response { request_id: u32, response: Response },
}

impl Packet {
    pub fn outer_kind(&self) -> OuterKind {
        match self {
            Packet::Event(_) => OuterKind::Event,
            Packet::Request { .. } => OuterKind::Request,
            Packet::Response { .. } => OuterKind::Response,
        }
    }
}
