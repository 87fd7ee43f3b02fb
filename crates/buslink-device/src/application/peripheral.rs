//! The boundary between the link and a peripheral model.
//!
//! A [`Peripheral`] answers the master's accesses. While it does so it may
//! call back into the master through the [`DeviceBus`] it is handed: raise
//! an interrupt, perform DMA, read the virtual clock or schedule a timer.
//! Those calls are nested round trips on the same stream and are legal from
//! inside any callback.

use buslink_core::protocol::messages::{CallbackToken, TimerEvent};
use buslink_core::LinkError;
use thiserror::Error;

/// Error type for peripheral callbacks.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The peripheral has no handler for this operation.
    #[error("no handler for this operation")]
    Missing,

    /// The peripheral refused the access (bad offset, read-only register, ...).
    #[error("access rejected: {0}")]
    Rejected(String),

    /// A nested call back into the master failed.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Why the master is ending the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Exit,
    Shutdown,
}

/// A one-shot timer callback. It is removed from the session before it runs,
/// so it may schedule a follow-up event for itself.
pub type TimerCallback =
    Box<dyn FnOnce(&mut dyn DeviceBus, TimerEvent) -> Result<(), CallbackError> + Send>;

/// Operations a device issues towards the master.
///
/// Every method except [`close`](DeviceBus::close) requires a registered
/// session and fails with [`LinkError::NotReady`] otherwise.
pub trait DeviceBus {
    fn irq_raise(&mut self, line: u8) -> Result<(), LinkError>;

    fn irq_lower(&mut self, line: u8) -> Result<(), LinkError>;

    /// Emits a single `SetIrq` event with level `Pulse`.
    fn irq_pulse(&mut self, line: u8) -> Result<(), LinkError>;

    /// Reads `length` bytes of guest memory.
    fn dma_read(&mut self, address: u64, length: u32) -> Result<Vec<u8>, LinkError>;

    /// Writes `data` to guest memory, at most four bytes per request.
    fn dma_write(&mut self, address: u64, data: &[u8]) -> Result<(), LinkError>;

    /// Current virtual time of the master.
    fn get_time(&mut self) -> Result<u64, LinkError>;

    /// Asks the master to fire `callback` at `expire_time`.
    ///
    /// Returns as soon as the `RegisterEvent` is written. The master never
    /// acknowledges it, so a lost registration goes unnoticed.
    fn schedule_event(
        &mut self,
        expire_time: u64,
        event_id: u32,
        callback: TimerCallback,
    ) -> Result<CallbackToken, LinkError>;

    /// Ends the session. The run loop returns once the current dispatch
    /// finishes.
    fn close(&mut self);
}

/// A peripheral model attached to the bus.
///
/// Every handler has a default that reports [`CallbackError::Missing`],
/// so a model only implements what it decodes. Handlers take `&self`
/// because the session may re-enter the same peripheral while a handler is
/// still running (a DMA read that the master routes back to this device);
/// state therefore lives behind interior mutability, and locks must not be
/// held across `bus` calls.
pub trait Peripheral: Send + Sync {
    /// MMIO read of `length` bytes (at most four). The value is returned
    /// little-endian, truncated to `length` bytes.
    fn read(&self, bus: &mut dyn DeviceBus, address: u64, length: u32) -> Result<u32, CallbackError> {
        let _ = (bus, address, length);
        Err(CallbackError::Missing)
    }

    /// MMIO write of one to four bytes.
    fn write(&self, bus: &mut dyn DeviceBus, address: u64, data: &[u8]) -> Result<(), CallbackError> {
        let _ = (bus, address, data);
        Err(CallbackError::Missing)
    }

    fn init(&self, bus: &mut dyn DeviceBus) -> Result<(), CallbackError> {
        let _ = bus;
        Err(CallbackError::Missing)
    }

    fn reset(&self, bus: &mut dyn DeviceBus) -> Result<(), CallbackError> {
        let _ = bus;
        Err(CallbackError::Missing)
    }

    /// Called for both `Exit` and `Shutdown`.
    fn exit(&self, bus: &mut dyn DeviceBus, reason: ExitReason) -> Result<(), CallbackError> {
        let _ = (bus, reason);
        Err(CallbackError::Missing)
    }
}

/// Stand-in used until a peripheral is registered. Handles nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattached;

impl Peripheral for Unattached {}
