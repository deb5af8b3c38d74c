//! MBC1
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM Enable (low nibble 0x0A enables)
//! - 0x2000-0x3FFF: ROM Bank Number (lower 5 bits, 0 reads as 1)
//! - 0x4000-0x5FFF: Secondary 2-bit register
//! - 0x6000-0x7FFF: Banking Mode Select
//!
//! In mode 0 the secondary register supplies ROM bank bits 5-6 and RAM bank 0
//! is fixed. In mode 1 it selects the RAM bank instead.

use serde::{Deserialize, Serialize};

use super::Selection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbc1 {
    pub ram_enable: u8,
    pub rom_low: u8,
    pub secondary: u8,
    pub mode: bool,
}

impl Mbc1 {
    pub fn new() -> Self {
        Self {
            rom_low: 1,
            ..Self::default()
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val,
            0x2000..=0x3FFF => {
                let bank = val & 0x1F;
                self.rom_low = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x5FFF => self.secondary = val & 0x03,
            0x6000..=0x7FFF => self.mode = val & 0x01 != 0,
            _ => {}
        }
    }

    pub(crate) fn selection(&self) -> Selection {
        let (rom, ram) = if self.mode {
            (self.rom_low as usize, self.secondary as usize)
        } else {
            (((self.secondary as usize) << 5) | self.rom_low as usize, 0)
        };
        Selection {
            rom,
            ram,
            ram_enabled: self.ram_enable & 0x0F == 0x0A,
        }
    }
}
