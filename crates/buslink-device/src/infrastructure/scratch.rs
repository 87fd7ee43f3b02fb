//! A small demo peripheral exercising every bus operation.
//!
//! Register map (offsets from the first claimed region, 32-bit registers):
//!
//! | Offset | Name         | Access | Behaviour                                        |
//! |--------|--------------|--------|--------------------------------------------------|
//! | 0x00   | `ID`         | RO     | `0x5C7A_0001`                                    |
//! | 0x04   | `SCRATCH`    | RW     | Plain storage                                    |
//! | 0x08   | `PERIOD`     | RW     | Non-zero starts a periodic timer, 0 stops it     |
//! | 0x0C   | `TICKS`      | RO     | Timer expirations since reset                    |
//! | 0x10   | `DMA_ADDR`   | RW     | Guest address used by `DMA_CMD`                  |
//! | 0x14   | `DMA_CMD`    | WO     | 1: store `SCRATCH` to `DMA_ADDR`; 2: load it back |
//! | 0x18   | `IRQ_CTRL`   | WO     | 1: raise, 0: lower, 2: pulse                      |
//!
//! Every timer expiration and completed DMA command pulses the configured
//! interrupt line.

use std::sync::{Arc, Mutex, MutexGuard};

use buslink_core::protocol::messages::TimerEvent;
use tracing::{debug, info};

use crate::application::peripheral::{CallbackError, DeviceBus, ExitReason, Peripheral};

pub const SCRATCH_ID: u32 = 0x5C7A_0001;

pub const REG_ID: u64 = 0x00;
pub const REG_SCRATCH: u64 = 0x04;
pub const REG_PERIOD: u64 = 0x08;
pub const REG_TICKS: u64 = 0x0C;
pub const REG_DMA_ADDR: u64 = 0x10;
pub const REG_DMA_CMD: u64 = 0x14;
pub const REG_IRQ_CTRL: u64 = 0x18;

pub const DMA_CMD_STORE: u32 = 1;
pub const DMA_CMD_LOAD: u32 = 2;

#[derive(Debug, Default)]
struct ScratchState {
    scratch: u32,
    period: u32,
    ticks: u32,
    dma_addr: u64,
    /// Bumped whenever the timer is reprogrammed; stale expirations carry an
    /// older generation in their event id and are dropped.
    generation: u32,
}

/// Demo peripheral. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ScratchDevice {
    base: u64,
    irq_line: u8,
    state: Arc<Mutex<ScratchState>>,
}

impl ScratchDevice {
    pub fn new(base: u64, irq_line: u8) -> Self {
        Self {
            base,
            irq_line,
            state: Arc::new(Mutex::new(ScratchState::default())),
        }
    }

    pub fn ticks(&self) -> u32 {
        self.lock().ticks
    }

    pub fn scratch(&self) -> u32 {
        self.lock().scratch
    }

    // Plain data; poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, ScratchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn offset(&self, address: u64) -> Result<u64, CallbackError> {
        address
            .checked_sub(self.base)
            .filter(|offset| offset % 4 == 0 && *offset <= REG_IRQ_CTRL)
            .ok_or_else(|| CallbackError::Rejected(format!("no register at {address:#x}")))
    }

    fn program_timer(&self, bus: &mut dyn DeviceBus, period: u32) -> Result<(), CallbackError> {
        let generation = {
            let mut state = self.lock();
            state.period = period;
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };
        if period == 0 {
            debug!("scratch timer stopped");
            return Ok(());
        }
        let now = bus.get_time()?;
        self.arm(bus, deadline(now, period)?, generation)
    }

    fn arm(&self, bus: &mut dyn DeviceBus, expire_time: u64, generation: u32) -> Result<(), CallbackError> {
        let device = self.clone();
        bus.schedule_event(
            expire_time,
            generation,
            Box::new(move |bus, event| device.on_timer(bus, event)),
        )?;
        Ok(())
    }

    fn on_timer(&self, bus: &mut dyn DeviceBus, event: TimerEvent) -> Result<(), CallbackError> {
        let period = {
            let mut state = self.lock();
            if event.event_id != state.generation || state.period == 0 {
                debug!(event_id = event.event_id, "stale scratch timer dropped");
                return Ok(());
            }
            state.ticks = state.ticks.wrapping_add(1);
            state.period
        };
        bus.irq_pulse(self.irq_line)?;
        self.arm(bus, deadline(event.expire_time, period)?, event.event_id)
    }

    fn run_dma(&self, bus: &mut dyn DeviceBus, command: u32) -> Result<(), CallbackError> {
        let (address, value) = {
            let state = self.lock();
            (state.dma_addr, state.scratch)
        };
        match command {
            DMA_CMD_STORE => bus.dma_write(address, &value.to_le_bytes())?,
            DMA_CMD_LOAD => {
                let bytes = bus.dma_read(address, 4)?;
                let word: [u8; 4] = bytes
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| CallbackError::Rejected("short DMA read".to_string()))?;
                self.lock().scratch = u32::from_le_bytes(word);
            }
            other => return Err(CallbackError::Rejected(format!("unknown DMA command {other}"))),
        }
        bus.irq_pulse(self.irq_line)?;
        Ok(())
    }
}

// `from` comes from the master and may be anywhere in the u64 range.
fn deadline(from: u64, period: u32) -> Result<u64, CallbackError> {
    from.checked_add(u64::from(period)).ok_or_else(|| {
        CallbackError::Rejected(format!("timer deadline {from} + {period} overflows"))
    })
}

impl Peripheral for ScratchDevice {
    fn read(&self, _bus: &mut dyn DeviceBus, address: u64, _length: u32) -> Result<u32, CallbackError> {
        let state = self.lock();
        match self.offset(address)? {
            REG_ID => Ok(SCRATCH_ID),
            REG_SCRATCH => Ok(state.scratch),
            REG_PERIOD => Ok(state.period),
            REG_TICKS => Ok(state.ticks),
            REG_DMA_ADDR => Ok(state.dma_addr as u32),
            _ => Err(CallbackError::Rejected(format!("register at {address:#x} is write-only"))),
        }
    }

    fn write(&self, bus: &mut dyn DeviceBus, address: u64, data: &[u8]) -> Result<(), CallbackError> {
        let mut word = [0u8; 4];
        let n = data.len().min(word.len());
        word[..n].copy_from_slice(&data[..n]);
        let value = u32::from_le_bytes(word);

        match self.offset(address)? {
            REG_SCRATCH => self.lock().scratch = value,
            REG_PERIOD => self.program_timer(bus, value)?,
            REG_DMA_ADDR => self.lock().dma_addr = u64::from(value),
            REG_DMA_CMD => self.run_dma(bus, value)?,
            REG_IRQ_CTRL => match value {
                0 => bus.irq_lower(self.irq_line)?,
                1 => bus.irq_raise(self.irq_line)?,
                2 => bus.irq_pulse(self.irq_line)?,
                other => return Err(CallbackError::Rejected(format!("bad IRQ_CTRL value {other}"))),
            },
            _ => return Err(CallbackError::Rejected(format!("register at {address:#x} is read-only"))),
        }
        Ok(())
    }

    fn init(&self, _bus: &mut dyn DeviceBus) -> Result<(), CallbackError> {
        info!(base = self.base, irq_line = self.irq_line, "scratch device initialised");
        Ok(())
    }

    fn reset(&self, _bus: &mut dyn DeviceBus) -> Result<(), CallbackError> {
        let mut state = self.lock();
        let generation = state.generation.wrapping_add(1);
        *state = ScratchState {
            generation,
            ..ScratchState::default()
        };
        debug!("scratch device reset");
        Ok(())
    }

    fn exit(&self, bus: &mut dyn DeviceBus, reason: ExitReason) -> Result<(), CallbackError> {
        info!(?reason, ticks = self.ticks(), "master ended the session");
        bus.close();
        Ok(())
    }
}
