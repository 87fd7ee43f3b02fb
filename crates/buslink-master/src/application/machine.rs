//! The emulated machine a device is attached to.

use buslink_core::protocol::messages::{Event, TargetEndianness, TimerEvent};
use tracing::{debug, warn};

use crate::application::clock::VirtualClock;
use crate::application::events::EventQueue;
use crate::application::irq::IrqLines;
use crate::application::memory::{GuestMemory, MemoryError};

pub struct Machine {
    memory: GuestMemory,
    irqs: IrqLines,
    events: EventQueue,
    clock: Box<dyn VirtualClock>,
    target_endianness: TargetEndianness,
}

impl Machine {
    pub fn new(memory: GuestMemory, clock: Box<dyn VirtualClock>) -> Self {
        Self {
            memory,
            irqs: IrqLines::new(),
            events: EventQueue::new(),
            clock,
            target_endianness: TargetEndianness::default(),
        }
    }

    pub fn with_target_endianness(mut self, endianness: TargetEndianness) -> Self {
        self.target_endianness = endianness;
        self
    }

    pub fn target_endianness(&self) -> TargetEndianness {
        self.target_endianness
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut GuestMemory {
        &mut self.memory
    }

    pub fn irqs(&self) -> &IrqLines {
        &self.irqs
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// Applies an event sent by the device.
    ///
    /// `SetIrq` drives the interrupt model and `RegisterEvent` queues a
    /// timer. The master never receives the other kinds from a well-behaved
    /// device; they are logged and dropped.
    pub fn apply_event(&mut self, event: Event) {
        match event {
            Event::SetIrq { line, level } => {
                debug!(line, ?level, "irq");
                self.irqs.apply(line, level);
            }
            Event::RegisterEvent(timer) => {
                debug!(
                    token = timer.callback_token.0,
                    expire_time = timer.expire_time,
                    event_id = timer.event_id,
                    "timer registered"
                );
                self.events.schedule(timer);
            }
            other => warn!(kind = ?other.kind(), "device sent a master-to-device event, ignoring"),
        }
    }

    /// Removes the timers whose deadline has passed.
    pub fn take_due_events(&mut self) -> Vec<TimerEvent> {
        let now = self.clock.now();
        self.events.drain_due(now)
    }

    pub fn dma_read(&self, address: u64, length: u32) -> Result<Vec<u8>, MemoryError> {
        self.memory.read(address, length)
    }

    pub fn dma_write(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        self.memory.write(address, data)
    }
}
