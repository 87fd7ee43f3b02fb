//! Interrupt line model.
//!
//! `High`/`Low` set a level. `Pulse` is an edge: it is counted, and leaves
//! the line low.

use std::collections::BTreeMap;

use buslink_core::protocol::messages::IrqLevel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqLine {
    pub asserted: bool,
    /// Low-to-high transitions caused by `High`.
    pub raises: u64,
    pub pulses: u64,
}

#[derive(Debug, Clone, Default)]
pub struct IrqLines {
    lines: BTreeMap<u8, IrqLine>,
}

impl IrqLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, line: u8, level: IrqLevel) {
        let state = self.lines.entry(line).or_default();
        match level {
            IrqLevel::High => {
                if !state.asserted {
                    state.raises += 1;
                }
                state.asserted = true;
            }
            IrqLevel::Low => state.asserted = false,
            IrqLevel::Pulse => {
                state.pulses += 1;
                state.asserted = false;
            }
        }
    }

    /// State of `line`; lines never signalled read as idle.
    pub fn line(&self, line: u8) -> IrqLine {
        self.lines.get(&line).copied().unwrap_or_default()
    }

    pub fn is_asserted(&self, line: u8) -> bool {
        self.line(line).asserted
    }

    /// Lines currently held high, in ascending order.
    pub fn asserted(&self) -> Vec<u8> {
        self.lines
            .iter()
            .filter(|(_, state)| state.asserted)
            .map(|(line, _)| *line)
            .collect()
    }
}
