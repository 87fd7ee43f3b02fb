//! The master's end of a bus link session.
//!
//! A [`MasterLink`] accepts one device's registration, then drives it with
//! MMIO reads and writes, lifecycle requests and timer triggers, while
//! serving the device's own interrupts, DMA and clock requests. DMA that
//! lands in the device's own MMIO window is forwarded back to the device as
//! a nested request from inside the DMA handler.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use buslink_core::protocol::messages::{
    DeviceEndianness, Event, MemoryRegion, Packet, RegisterRequest, Request, Response,
    ResponseKind, SharedRegion, PROTOCOL_VERSION,
};
use buslink_core::{Channel, LinkError, LinkState, Peer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::machine::Machine;

/// Error type for master-side operations.
#[derive(Debug, Error)]
pub enum MasterError {
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The access falls outside every region the device registered.
    #[error("access of {length} bytes at {address:#x} is outside the device's regions")]
    Unmapped { address: u64, length: u64 },

    #[error("registration refused: {0}")]
    Registration(String),
}

/// What the master knows about a registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u32,
    pub device_id: u32,
    pub name: String,
    pub description: String,
    pub endianness: DeviceEndianness,
    pub memory_regions: Vec<MemoryRegion>,
    pub shared_regions: Vec<SharedRegion>,
}

impl DeviceInfo {
    /// Returns `true` when one MMIO region covers the whole access.
    pub fn decodes(&self, address: u64, length: u64) -> bool {
        self.memory_regions
            .iter()
            .any(|r| r.contains(address, length))
    }
}

impl From<RegisterRequest> for DeviceInfo {
    fn from(r: RegisterRequest) -> Self {
        Self {
            vendor_id: r.vendor_id,
            device_id: r.device_id,
            name: r.name,
            description: r.description,
            endianness: r.endianness,
            memory_regions: r.memory_regions,
            shared_regions: r.shared_regions,
        }
    }
}

/// A master session over any duplex byte stream.
pub struct MasterLink<S = TcpStream> {
    channel: Channel<S>,
    machine: Machine,
    device: Option<DeviceInfo>,
}

impl MasterLink<TcpStream> {
    /// Waits for the next device connection on `listener`.
    pub fn accept(listener: &TcpListener, machine: Machine) -> Result<Self, LinkError> {
        let (stream, peer) = listener.accept().map_err(LinkError::Io)?;
        info!(%peer, "device connected");
        Ok(Self::new(stream, machine))
    }

    /// Waits up to `timeout` for inbound bytes without consuming any.
    ///
    /// Returns `true` when a read would not block, including when the device
    /// has disconnected; the following read then reports it.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool, LinkError> {
        let stream = self.channel.get_ref();
        stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
            .map_err(LinkError::Io)?;
        let mut probe = [0u8; 1];
        let peeked = stream.peek(&mut probe);
        stream.set_read_timeout(None).map_err(LinkError::Io)?;
        match peeked {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
            Err(e) => Err(LinkError::from_io(e)),
        }
    }

    /// Serves the device until it disconnects, firing due timers at least
    /// every `tick`.
    pub fn serve(&mut self, tick: Duration) -> Result<(), MasterError> {
        loop {
            self.fire_due_events()?;
            let served = match self.wait_readable(tick) {
                Ok(false) => continue,
                Ok(true) => self.serve_one(),
                Err(e) => Err(e),
            };
            match served {
                Ok(()) => {}
                Err(LinkError::ConnectionClosed) => {
                    info!("device disconnected");
                    self.channel.close();
                    return Ok(());
                }
                Err(e) => {
                    self.channel.close();
                    return Err(e.into());
                }
            }
        }
    }
}

impl<S: Read + Write> MasterLink<S> {
    pub fn new(stream: S, machine: Machine) -> Self {
        Self {
            channel: Channel::new(stream),
            machine,
            device: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.channel.state()
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn get_ref(&self) -> &S {
        self.channel.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.channel.into_inner()
    }

    /// Reads the device's `Register` request and answers it.
    ///
    /// The registration is refused with `Error{1}` (and the session closed)
    /// when the protocol version differs, the name is empty, or its regions
    /// overlap each other or guest RAM.
    pub fn accept_registration(&mut self) -> Result<&DeviceInfo, MasterError> {
        let state = self.channel.state();
        if state != LinkState::Connecting {
            return Err(MasterError::Registration(format!("session is already {state}")));
        }

        let (request_id, body) = match self.channel.recv()? {
            Packet::Request {
                request_id,
                request: Request::Register(body),
            } => (request_id, body),
            other => {
                self.channel.close();
                return Err(MasterError::Registration(format!(
                    "expected a Register request, received {:?}",
                    other.outer_kind()
                )));
            }
        };

        if let Err(reason) = self.validate(&body) {
            warn!(%reason, name = %body.name, "refusing registration");
            let sent = self.channel.send_response(request_id, Response::failed());
            self.channel.close();
            sent?;
            return Err(MasterError::Registration(reason));
        }

        self.channel.send_response(request_id, Response::ok())?;
        self.channel.mark_ready();
        info!(
            name = %body.name,
            vendor_id = body.vendor_id,
            device_id = body.device_id,
            regions = body.memory_regions.len(),
            "device registered"
        );
        Ok(&*self.device.insert(DeviceInfo::from(body)))
    }

    fn validate(&self, body: &RegisterRequest) -> Result<(), String> {
        if body.protocol_version != PROTOCOL_VERSION {
            return Err(format!(
                "protocol version {} not supported (expected {PROTOCOL_VERSION})",
                body.protocol_version
            ));
        }
        if body.name.is_empty() {
            return Err("device name is empty".to_string());
        }
        let regions: Vec<MemoryRegion> = body
            .memory_regions
            .iter()
            .copied()
            .chain(body.shared_regions.iter().map(|s| MemoryRegion {
                base: s.base,
                size: s.size,
            }))
            .collect();
        for (i, region) in regions.iter().enumerate() {
            if region.size == 0 {
                return Err(format!("region at {:#x} is empty", region.base));
            }
            if regions[i + 1..].iter().any(|other| region.overlaps(other)) {
                return Err(format!("region at {:#x} overlaps another region", region.base));
            }
            if self.machine.memory().overlaps(region) {
                return Err(format!("region at {:#x} overlaps guest RAM", region.base));
            }
        }
        Ok(())
    }

    fn ensure_decoded(&self, address: u64, length: u64) -> Result<(), MasterError> {
        self.channel.ensure_ready()?;
        match &self.device {
            Some(device) if device.decodes(address, length) => Ok(()),
            _ => Err(MasterError::Unmapped { address, length }),
        }
    }

    /// MMIO read from the device.
    pub fn read(&mut self, address: u64, length: u32) -> Result<Vec<u8>, MasterError> {
        self.ensure_decoded(address, u64::from(length))?;
        match self.send_request_and_wait(Request::Read { address, length })? {
            Response::Data(data) => Ok(data),
            Response::Error { code } => Err(LinkError::Remote { code }.into()),
            other => Err(self.unexpected_kind(ResponseKind::Data, other.kind()).into()),
        }
    }

    /// MMIO read of a little-endian 32-bit register.
    pub fn read_u32(&mut self, address: u64) -> Result<u32, MasterError> {
        let data = self.read(address, 4)?;
        let word: [u8; 4] = data.as_slice().try_into().map_err(|_| {
            self.channel.close();
            LinkError::Protocol(format!("4-byte read answered with {} bytes", data.len()))
        })?;
        Ok(u32::from_le_bytes(word))
    }

    /// MMIO write to the device. The device refuses writes wider than four
    /// bytes with `Error{1}`, surfaced as [`LinkError::Remote`].
    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<(), MasterError> {
        self.ensure_decoded(address, data.len() as u64)?;
        self.call_status(Request::Write {
            address,
            data: data.to_vec(),
        })?;
        Ok(())
    }

    pub fn write_u32(&mut self, address: u64, value: u32) -> Result<(), MasterError> {
        self.write(address, &value.to_le_bytes())
    }

    pub fn init(&mut self) -> Result<(), MasterError> {
        self.channel.ensure_ready()?;
        self.call_status(Request::Init)?;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), MasterError> {
        self.channel.ensure_ready()?;
        self.call_status(Request::Reset)?;
        Ok(())
    }

    pub fn exit(&mut self) -> Result<(), MasterError> {
        self.channel.ensure_ready()?;
        self.channel.send_event(Event::Exit)?;
        Ok(())
    }

    pub fn shutdown(&mut self) -> Result<(), MasterError> {
        self.channel.ensure_ready()?;
        self.channel.send_event(Event::Shutdown)?;
        Ok(())
    }

    /// Sends a `TriggerEvent` for every device timer whose deadline has
    /// passed. Returns how many fired.
    pub fn fire_due_events(&mut self) -> Result<usize, MasterError> {
        self.channel.ensure_ready()?;
        let due = self.machine.take_due_events();
        for event in &due {
            debug!(token = event.callback_token.0, expire_time = event.expire_time, "firing timer");
            self.channel.send_event(Event::TriggerEvent(*event))?;
        }
        Ok(due.len())
    }

    fn serve_request(&mut self, request: Request) -> Result<Response, LinkError> {
        match request {
            Request::GetTime => Ok(Response::Time(self.machine.now())),
            Request::Read { address, length } => self.serve_dma_read(address, length),
            Request::Write { address, data } => self.serve_dma_write(address, data),
            other => {
                warn!(kind = ?other.kind(), "device sent a master-to-device request");
                Ok(Response::failed())
            }
        }
    }

    fn targets_device(&self, address: u64, length: u64) -> bool {
        self.device
            .as_ref()
            .is_some_and(|device| device.decodes(address, length))
    }

    fn serve_dma_read(&mut self, address: u64, length: u32) -> Result<Response, LinkError> {
        if self.targets_device(address, u64::from(length)) {
            debug!(address, length, "DMA read hits device MMIO, forwarding");
            return match self.send_request_and_wait(Request::Read { address, length })? {
                response @ (Response::Data(_) | Response::Error { .. }) => Ok(response),
                other => Err(self.unexpected_kind(ResponseKind::Data, other.kind())),
            };
        }
        match self.machine.dma_read(address, length) {
            Ok(data) => Ok(Response::Data(data)),
            Err(e) => {
                warn!(error = %e, "DMA read refused");
                Ok(Response::failed())
            }
        }
    }

    fn serve_dma_write(&mut self, address: u64, data: Vec<u8>) -> Result<Response, LinkError> {
        if self.targets_device(address, data.len() as u64) {
            debug!(address, length = data.len(), "DMA write hits device MMIO, forwarding");
            return match self.send_request_and_wait(Request::Write { address, data })? {
                response @ Response::Error { .. } => Ok(response),
                other => Err(self.unexpected_kind(ResponseKind::Error, other.kind())),
            };
        }
        match self.machine.dma_write(address, &data) {
            Ok(()) => Ok(Response::ok()),
            Err(e) => {
                warn!(error = %e, "DMA write refused");
                Ok(Response::failed())
            }
        }
    }
}

impl<S: Read + Write> Peer for MasterLink<S> {
    type Stream = S;

    fn channel(&mut self) -> &mut Channel<S> {
        &mut self.channel
    }

    fn dispatch(&mut self, packet: Packet) -> Result<(), LinkError> {
        match packet {
            Packet::Event(event) => {
                self.machine.apply_event(event);
                Ok(())
            }
            Packet::Request {
                request_id,
                request,
            } => {
                debug!(request_id, kind = ?request.kind(), "serving device request");
                let response = self.serve_request(request)?;
                self.channel.send_response(request_id, response)
            }
            Packet::Response { request_id, .. } => Err(LinkError::Protocol(format!(
                "response {request_id} reached the dispatcher"
            ))),
        }
    }
}
