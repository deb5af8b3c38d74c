//! Cartridge image and header
//!
//! The image is split into 16 KiB ROM banks and the header-declared external
//! RAM into 8 KiB banks. Bank controllers address both tables by index, so a
//! bad bank number is an `Option::None` rather than a dangling pointer.
//!
//! # Header fields used
//!
//! | Offset | Meaning |
//! |--------|---------|
//! | 0x0134-0x0142 | Title |
//! | 0x0143 | Color flag (bit 7) |
//! | 0x0147 | Cartridge type (selects the bank controller) |
//! | 0x0148 | ROM size: `32 KiB << n`, at most 8 |
//! | 0x0149 | RAM size code |

use emu_core::logging::{log, LogCategory, LogLevel};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_END: usize = 0x150;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("Cartridge image is smaller than its header")]
    TooSmall,
    #[error("Unsupported ROM size code {0:#04X}")]
    UnsupportedRomSize(u8),
    #[error("Save data is {actual} bytes, cartridge RAM is {expected} bytes")]
    SaveSizeMismatch { expected: usize, actual: usize },
}

/// Bank controller family named by header byte 0x147
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc3,
    Mbc5,
}

impl MbcKind {
    pub fn from_header(cart_type: u8) -> Self {
        match cart_type {
            0x01..=0x03 => MbcKind::Mbc1,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            _ => MbcKind::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    pub title: String,
    pub kind: MbcKind,
    /// Declares color support
    pub color: bool,
    /// External RAM is battery backed and worth persisting
    pub battery: bool,
    pub ram_size: usize,
    rom_banks: Vec<Vec<u8>>,
    ram_banks: Vec<Vec<u8>>,
}

impl Cartridge {
    pub fn from_bytes(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TooSmall);
        }

        let rom_code = data[0x148];
        if rom_code > 8 {
            return Err(CartridgeError::UnsupportedRomSize(rom_code));
        }
        let rom_size = 0x8000usize << rom_code;
        if data.len() < rom_size {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "image is {} bytes, header declares {}; padding with 0xFF",
                    data.len(),
                    rom_size
                )
            });
        }

        let mut rom = data[..data.len().min(rom_size)].to_vec();
        rom.resize(rom_size, 0xFF);
        let rom_banks = rom.chunks(ROM_BANK_SIZE).map(<[u8]>::to_vec).collect();

        let ram_size = match data[0x149] {
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        };
        let ram_banks = vec![vec![0; RAM_BANK_SIZE]; ram_size / RAM_BANK_SIZE];

        let title = data[0x134..0x143]
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|&b| b as char)
            .collect::<String>();

        let cart_type = data[0x147];
        let cart = Self {
            title,
            kind: MbcKind::from_header(cart_type),
            color: data[0x143] & 0x80 != 0,
            battery: matches!(cart_type, 0x03 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E),
            ram_size,
            rom_banks,
            ram_banks,
        };
        log(LogCategory::Cartridge, LogLevel::Info, || {
            format!(
                "loaded \"{}\": {:?}, {} ROM banks, {} RAM banks{}",
                cart.title,
                cart.kind,
                cart.rom_bank_count(),
                cart.ram_bank_count(),
                if cart.color { ", color" } else { "" }
            )
        });
        Ok(cart)
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom_banks.len()
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram_banks.len()
    }

    pub fn has_rom_bank(&self, n: usize) -> bool {
        n < self.rom_banks.len()
    }

    pub fn has_ram_bank(&self, n: usize) -> bool {
        n < self.ram_banks.len()
    }

    pub fn rom_bank(&self, n: usize) -> Option<&[u8]> {
        let bank = self.rom_banks.get(n).map(Vec::as_slice);
        if bank.is_none() {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("ROM bank {} out of range ({} banks)", n, self.rom_banks.len())
            });
        }
        bank
    }

    pub fn ram_bank(&self, n: usize) -> Option<&[u8]> {
        self.ram_banks.get(n).map(Vec::as_slice)
    }

    pub fn ram_bank_mut(&mut self, n: usize) -> Option<&mut [u8]> {
        self.ram_banks.get_mut(n).map(Vec::as_mut_slice)
    }

    /// Replace external RAM with a previously saved image.
    pub fn load_ram(&mut self, data: &[u8]) -> Result<(), CartridgeError> {
        if data.len() != self.ram_size {
            return Err(CartridgeError::SaveSizeMismatch {
                expected: self.ram_size,
                actual: data.len(),
            });
        }
        for (bank, chunk) in self.ram_banks.iter_mut().zip(data.chunks(RAM_BANK_SIZE)) {
            bank.copy_from_slice(chunk);
        }
        Ok(())
    }

    /// External RAM contents, banks concatenated
    pub fn ram(&self) -> Vec<u8> {
        self.ram_banks.concat()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Blank image with the given header bytes; bank `n` is filled with `n`.
    pub(crate) fn make_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let size = 0x8000usize << rom_code;
        let mut rom: Vec<u8> = (0..size).map(|i| (i / ROM_BANK_SIZE) as u8).collect();
        rom[0x134..0x138].copy_from_slice(b"TEST");
        rom[0x138..0x143].fill(0);
        rom[0x143] = 0;
        rom[0x147] = cart_type;
        rom[0x148] = rom_code;
        rom[0x149] = ram_code;
        rom
    }

    #[test]
    fn test_header_parsing() {
        let mut rom = make_rom(0x13, 2, 3);
        rom[0x143] = 0xC0;
        let cart = Cartridge::from_bytes(&rom).expect("valid cart");
        assert_eq!(cart.title, "TEST");
        assert_eq!(cart.kind, MbcKind::Mbc3);
        assert!(cart.color);
        assert!(cart.battery);
        assert_eq!(cart.rom_bank_count(), 8);
        assert_eq!(cart.ram_size, 0x8000);
        assert_eq!(cart.ram_bank_count(), 4);
    }

    #[test]
    fn test_mbc_kind_ranges() {
        assert_eq!(MbcKind::from_header(0x00), MbcKind::None);
        assert_eq!(MbcKind::from_header(0x03), MbcKind::Mbc1);
        assert_eq!(MbcKind::from_header(0x05), MbcKind::None);
        assert_eq!(MbcKind::from_header(0x0F), MbcKind::Mbc3);
        assert_eq!(MbcKind::from_header(0x1E), MbcKind::Mbc5);
        assert_eq!(MbcKind::from_header(0xFF), MbcKind::None);
    }

    #[test]
    fn test_ram_size_codes() {
        for (code, size) in [(0, 0), (1, 0), (2, 0x2000), (3, 0x8000), (4, 0x20000), (5, 0x10000)] {
            let cart = Cartridge::from_bytes(&make_rom(0x1B, 0, code)).expect("valid cart");
            assert_eq!(cart.ram_size, size, "code {}", code);
        }
    }

    #[test]
    fn test_rejects_large_rom_code() {
        let mut rom = make_rom(0x00, 0, 0);
        rom[0x148] = 0x09;
        assert_eq!(
            Cartridge::from_bytes(&rom).unwrap_err(),
            CartridgeError::UnsupportedRomSize(0x09)
        );
        assert_eq!(
            Cartridge::from_bytes(&rom[..0x100]).unwrap_err(),
            CartridgeError::TooSmall
        );
    }

    #[test]
    fn test_short_image_is_padded() {
        let mut rom = make_rom(0x01, 1, 0);
        rom.truncate(0x9000);
        let cart = Cartridge::from_bytes(&rom).expect("padded cart");
        assert_eq!(cart.rom_bank_count(), 4);
        assert_eq!(cart.rom_bank(2).expect("bank 2")[0x0FFF], 2);
        assert_eq!(cart.rom_bank(2).expect("bank 2")[0x1000], 0xFF);
        assert_eq!(cart.rom_bank(3).expect("bank 3")[0], 0xFF);
        assert!(cart.rom_bank(4).is_none());
    }

    #[test]
    fn test_battery_ram_roundtrip() {
        let mut cart = Cartridge::from_bytes(&make_rom(0x03, 0, 3)).expect("valid cart");
        let save: Vec<u8> = (0..0x8000).map(|i| (i % 251) as u8).collect();
        cart.load_ram(&save).expect("matching size");
        assert_eq!(cart.ram_bank(1).expect("bank 1")[0], (0x2000 % 251) as u8);
        assert_eq!(cart.ram(), save);

        assert_eq!(
            cart.load_ram(&save[..0x2000]),
            Err(CartridgeError::SaveSizeMismatch {
                expected: 0x8000,
                actual: 0x2000
            })
        );
    }
}
