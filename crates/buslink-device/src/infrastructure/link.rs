//! The device's end of a bus link session.
//!
//! [`DeviceLink`] owns the stream, the registered peripheral and the timer
//! table. It implements [`Peer`] (so it inherits the correlator and the run
//! loop) and [`DeviceBus`] (so the peripheral can call back into the master
//! from inside any handler).
//!
//! Lifecycle:
//!
//! ```text
//! connect()/new() ──► Connecting ──register() ok──► Ready ──EOF/close()──► Closed
//!                          └──────── register() fails ─────────────────────┘
//! ```

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use buslink_core::protocol::messages::{
    CallbackToken, Event, IrqLevel, Packet, Request, Response, ResponseKind, TimerEvent,
    ERROR_OK, MAX_ACCESS_SIZE,
};
use buslink_core::{Channel, LinkError, LinkState, Peer};
use tracing::{debug, info, warn};

use crate::application::descriptor::DeviceDescriptor;
use crate::application::dispatch::{dispatch_exit, dispatch_request, fire_timer};
use crate::application::peripheral::{DeviceBus, ExitReason, Peripheral, TimerCallback, Unattached};
use crate::application::timers::TimerTable;

/// A device session over any duplex byte stream.
pub struct DeviceLink<S = TcpStream> {
    channel: Channel<S>,
    peripheral: Arc<dyn Peripheral>,
    timers: TimerTable,
    descriptor: Option<DeviceDescriptor>,
}

impl DeviceLink<TcpStream> {
    /// Opens a TCP connection to the master.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Io`] if the connection cannot be established.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, LinkError> {
        let stream = TcpStream::connect(addr).map_err(LinkError::Io)?;
        let peer = stream.peer_addr().map_err(LinkError::Io)?;
        info!(%peer, "connected to bus master");
        Ok(Self::new(stream))
    }

    /// Applies a deadline to every blocking read on the session.
    ///
    /// `None` restores the default of waiting forever. An expired deadline
    /// surfaces from the blocked call as a fatal [`LinkError::Io`].
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), LinkError> {
        self.channel
            .get_ref()
            .set_read_timeout(timeout)
            .map_err(LinkError::Io)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<(), LinkError> {
        self.channel.get_ref().set_nodelay(nodelay).map_err(LinkError::Io)
    }
}

impl<S: Read + Write> DeviceLink<S> {
    /// Wraps an already connected stream. The session starts `Connecting`.
    pub fn new(stream: S) -> Self {
        Self {
            channel: Channel::new(stream),
            peripheral: Arc::new(Unattached),
            timers: TimerTable::new(),
            descriptor: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.channel.state()
    }

    /// The descriptor accepted by the master, once registered.
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    /// Number of scheduled timer callbacks that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn get_ref(&self) -> &S {
        self.channel.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.channel.into_inner()
    }

    /// Registers `descriptor` with the master and attaches `peripheral`.
    ///
    /// The master must answer `Error{0}`. Any other answer, or a transport
    /// failure, closes the session.
    ///
    /// # Errors
    ///
    /// - [`LinkError::Remote`] if the master rejected the registration.
    /// - [`LinkError::Protocol`] if it answered with a non-`Error` response
    ///   or the session was not `Connecting`.
    /// - Any transport or decoding error from the exchange.
    pub fn register(
        &mut self,
        descriptor: DeviceDescriptor,
        peripheral: Arc<dyn Peripheral>,
    ) -> Result<(), LinkError> {
        let state = self.channel.state();
        if state != LinkState::Connecting {
            return Err(LinkError::Protocol(format!("register called on a {state} session")));
        }

        self.peripheral = peripheral;
        let request = Request::Register(descriptor.to_register_request());
        match self.send_request_and_wait(request) {
            Ok(Response::Error { code: ERROR_OK }) => {
                self.channel.mark_ready();
                info!(
                    name = descriptor.name(),
                    vendor_id = descriptor.vendor_id(),
                    device_id = descriptor.device_id(),
                    regions = descriptor.memory_regions().len(),
                    "device registered"
                );
                self.descriptor = Some(descriptor);
                Ok(())
            }
            Ok(Response::Error { code }) => {
                warn!(code, "registration rejected by master");
                self.channel.close();
                Err(LinkError::Remote { code })
            }
            Ok(other) => Err(self.unexpected_kind(ResponseKind::Error, other.kind())),
            Err(e) => {
                warn!(error = %e, "registration failed");
                self.channel.close();
                Err(e)
            }
        }
    }

    fn set_irq(&mut self, line: u8, level: IrqLevel) -> Result<(), LinkError> {
        self.channel.ensure_ready()?;
        debug!(line, ?level, "set irq");
        self.channel.send_event(Event::SetIrq { line, level })
    }
}

impl<S: Read + Write> Peer for DeviceLink<S> {
    type Stream = S;

    fn channel(&mut self) -> &mut Channel<S> {
        &mut self.channel
    }

    fn dispatch(&mut self, packet: Packet) -> Result<(), LinkError> {
        let peripheral = Arc::clone(&self.peripheral);
        let result = match packet {
            Packet::Request {
                request_id,
                request,
            } => {
                debug!(request_id, kind = ?request.kind(), "dispatching request");
                let response = dispatch_request(peripheral.as_ref(), self, request)?;
                self.channel.send_response(request_id, response)
            }
            Packet::Event(Event::Exit) => dispatch_exit(peripheral.as_ref(), self, ExitReason::Exit),
            Packet::Event(Event::Shutdown) => {
                dispatch_exit(peripheral.as_ref(), self, ExitReason::Shutdown)
            }
            Packet::Event(Event::TriggerEvent(event)) => {
                let callback = self.timers.take(event.callback_token);
                fire_timer(callback, self, event)
            }
            Packet::Event(other) => {
                warn!(kind = ?other.kind(), "master sent a device-to-master event, ignoring");
                Ok(())
            }
            Packet::Response { request_id, .. } => Err(LinkError::Protocol(format!(
                "response {request_id} reached the dispatcher"
            ))),
        };

        match result {
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "recoverable dispatch error");
                Ok(())
            }
            other => other,
        }
    }
}

impl<S: Read + Write> DeviceBus for DeviceLink<S> {
    fn irq_raise(&mut self, line: u8) -> Result<(), LinkError> {
        self.set_irq(line, IrqLevel::High)
    }

    fn irq_lower(&mut self, line: u8) -> Result<(), LinkError> {
        self.set_irq(line, IrqLevel::Low)
    }

    fn irq_pulse(&mut self, line: u8) -> Result<(), LinkError> {
        self.set_irq(line, IrqLevel::Pulse)
    }

    fn dma_read(&mut self, address: u64, length: u32) -> Result<Vec<u8>, LinkError> {
        self.channel.ensure_ready()?;
        match self.send_request_and_wait(Request::Read { address, length })? {
            Response::Data(data) if data.len() == length as usize => Ok(data),
            Response::Data(data) => {
                self.channel.close();
                Err(LinkError::Protocol(format!(
                    "dma read of {length} bytes answered with {} bytes",
                    data.len()
                )))
            }
            Response::Error { code } => Err(LinkError::Remote { code }),
            other => Err(self.unexpected_kind(ResponseKind::Data, other.kind())),
        }
    }

    fn dma_write(&mut self, address: u64, data: &[u8]) -> Result<(), LinkError> {
        self.channel.ensure_ready()?;
        let mut offset = 0u64;
        for chunk in data.chunks(MAX_ACCESS_SIZE) {
            self.call_status(Request::Write {
                address: address.wrapping_add(offset),
                data: chunk.to_vec(),
            })?;
            offset += chunk.len() as u64;
        }
        Ok(())
    }

    fn get_time(&mut self) -> Result<u64, LinkError> {
        self.channel.ensure_ready()?;
        match self.send_request_and_wait(Request::GetTime)? {
            Response::Time(now) => Ok(now),
            Response::Error { code } => Err(LinkError::Remote { code }),
            other => Err(self.unexpected_kind(ResponseKind::Time, other.kind())),
        }
    }

    fn schedule_event(
        &mut self,
        expire_time: u64,
        event_id: u32,
        callback: TimerCallback,
    ) -> Result<CallbackToken, LinkError> {
        self.channel.ensure_ready()?;
        let token = self.timers.insert(callback);
        let event = TimerEvent {
            expire_time,
            callback_token: token,
            event_id,
        };
        if let Err(e) = self.channel.send_event(Event::RegisterEvent(event)) {
            self.timers.cancel(token);
            return Err(e);
        }
        debug!(token = token.0, expire_time, event_id, "timer scheduled");
        Ok(token)
    }

    fn close(&mut self) {
        if self.channel.state() != LinkState::Closed {
            info!("device closing session");
        }
        self.channel.close();
    }
}
