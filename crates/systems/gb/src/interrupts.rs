//! Interrupt sources
//!
//! Requests are raised by setting a bit in IF (0xFF0F). The CPU services the
//! lowest set bit of `IE & IF` first, so the declaration order below is also
//! the priority order.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::Stat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    /// Mask of this source in IE / IF
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Handler address the CPU jumps to
    pub fn vector(self) -> u16 {
        0x40 + 8 * (self as u16)
    }
}
