//! MBC5
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM Enable (low nibble 0x0A enables)
//! - 0x2000-0x2FFF: ROM Bank Number, low 8 bits
//! - 0x3000-0x3FFF: ROM Bank Number, bit 8
//! - 0x4000-0x5FFF: RAM Bank Number (4 bits)
//!
//! Unlike MBC1/MBC3, bank 0 can be mapped into 0x4000-0x7FFF.

use serde::{Deserialize, Serialize};

use super::Selection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbc5 {
    pub ram_enable: u8,
    pub rom_bank: u16,
    pub ram_bank: u8,
}

impl Mbc5 {
    pub fn new() -> Self {
        Self {
            rom_bank: 1,
            ..Self::default()
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val,
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | val as u16,
            0x3000..=0x3FFF => self.rom_bank = (self.rom_bank & 0xFF) | ((val as u16 & 0x01) << 8),
            0x4000..=0x5FFF => self.ram_bank = val & 0x0F,
            _ => {}
        }
    }

    pub(crate) fn selection(&self) -> Selection {
        Selection {
            rom: self.rom_bank as usize,
            ram: self.ram_bank as usize,
            ram_enabled: self.ram_enable & 0x0F == 0x0A,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::BankController;
    use crate::cartridge::{tests::make_rom, Cartridge};

    fn mbc5(rom_code: u8, ram_code: u8) -> BankController {
        let rom = make_rom(0x1B, rom_code, ram_code);
        BankController::new(Cartridge::from_bytes(&rom).expect("cart"))
    }

    #[test]
    fn test_mbc5_bank_zero_is_selectable() {
        let mut mbc = mbc5(2, 0);
        mbc.write_rom(0x2000, 0x00);
        assert_eq!(mbc.rom_bank(), Some(0));
        assert_eq!(mbc.read_rom(0x4000), 0);
    }

    #[test]
    fn test_mbc5_nine_bit_bank() {
        let mut mbc = mbc5(8, 0);
        mbc.write_rom(0x2000, 0x05);
        mbc.write_rom(0x3000, 0x01);
        assert_eq!(mbc.rom_bank(), Some(0x105));
        // Bank contents are tagged with the low 8 bits of the bank number
        assert_eq!(mbc.read_rom(0x4000), 0x05);

        mbc.write_rom(0x3000, 0x00);
        assert_eq!(mbc.rom_bank(), Some(0x005));

        // Upper register keeps only bit 0
        mbc.write_rom(0x3FFF, 0xFE);
        assert_eq!(mbc.rom_bank(), Some(0x005));
    }

    #[test]
    fn test_mbc5_ram_bank_range() {
        let mut mbc = mbc5(0, 4);
        mbc.write_rom(0x0000, 0x0A);
        mbc.write_rom(0x4000, 0x0F);
        assert_eq!(mbc.ram_bank(), Some(15));
        mbc.write_ram(0xBFFF, 0x99);
        assert_eq!(mbc.read_ram(0xBFFF), 0x99);
        assert_eq!(mbc.cartridge().ram()[15 * 0x2000 + 0x1FFF], 0x99);

        mbc.write_rom(0x4000, 0x1F);
        assert_eq!(mbc.ram_bank(), Some(15));
    }
}
