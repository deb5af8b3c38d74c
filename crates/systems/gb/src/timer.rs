//! Game Boy Timer implementation
//!
//! # Timer Registers
//!
//! - `$FF04 (DIV)`: Divider register - increments every 64 M-cycles
//! - `$FF05 (TIMA)`: Timer counter - increments at the rate selected by TAC
//! - `$FF06 (TMA)`: Timer modulo - TIMA is loaded with this value on overflow
//! - `$FF07 (TAC)`: Timer control
//!   - Bit 2: Timer enable (0=stop, 1=run)
//!   - Bits 1-0: Clock select, in M-cycles per tick
//!     - 00: 256
//!     - 01: 4
//!     - 10: 16
//!     - 11: 64
//!
//! # Timing
//!
//! The timer is advanced in M-cycles, so the rates above hold in both normal
//! and double speed. When TIMA overflows it is reloaded with TMA and a timer
//! interrupt is requested.
//!
//! Writing DIV stores the written value instead of clearing the divider.

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// M-cycles per DIV increment
const DIV_PERIOD: u32 = 64;

/// M-cycles per TIMA increment for each TAC clock select
const TIMA_PERIODS: [u32; 4] = [256, 4, 16, 64];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    /// Divider register (FF04), always running
    pub div: u8,

    /// Timer counter (FF05)
    pub tima: u8,

    /// Timer modulo (FF06)
    pub tma: u8,

    /// Timer control (FF07). Stored as written; only bits 0-2 are used.
    pub tac: u8,

    div_cycles: u32,
    tima_cycles: u32,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac,
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.div = val,
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => self.tac = val,
            _ => {}
        }
    }

    /// Clock the timer by a number of M-cycles.
    ///
    /// Returns true if TIMA overflowed and a timer interrupt should be requested.
    pub fn step(&mut self, cycles: u32) -> bool {
        self.div_cycles += cycles;
        while self.div_cycles >= DIV_PERIOD {
            self.div = self.div.wrapping_add(1);
            self.div_cycles -= DIV_PERIOD;
        }

        if self.tac & 0x04 == 0 {
            return false;
        }

        let period = TIMA_PERIODS[(self.tac & 0x03) as usize];
        let mut overflow = false;
        self.tima_cycles += cycles;
        while self.tima_cycles >= period {
            self.tima_cycles -= period;
            if self.tima == 0xFF {
                self.tima = self.tma;
                overflow = true;
                let tma = self.tma;
                log(LogCategory::Timer, LogLevel::Trace, || {
                    format!("TIMA overflow, reloaded with {:02X}", tma)
                });
            } else {
                self.tima += 1;
            }
        }
        overflow
    }
}
