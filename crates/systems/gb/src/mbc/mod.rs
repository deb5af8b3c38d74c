//! Memory Bank Controllers
//!
//! A [`BankController`] owns the [`Cartridge`] and the register file of its
//! controller family. Writes into 0x0000-0x7FFF program the registers; every
//! such write re-resolves which ROM and RAM bank is visible, so reads through
//! 0x4000-0x7FFF and 0xA000-0xBFFF are a single table lookup.
//!
//! A bank number with no backing bank resolves to `None`. Reads through such
//! a window return 0xFF and writes are dropped.

mod mbc1;
mod mbc3;
mod mbc5;

pub use mbc1::Mbc1;
pub use mbc3::{Mbc3, Rtc};
pub use mbc5::Mbc5;

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use crate::cartridge::{Cartridge, MbcKind};

/// Outcome of a bus write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Ok,
    /// The address is read-only, unmapped or currently disabled
    Ignored,
}

/// Register file of the active controller family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Registers {
    None,
    Mbc1(Mbc1),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

/// What a family's registers currently select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selection {
    pub rom: usize,
    pub ram: usize,
    pub ram_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct BankController {
    cart: Cartridge,
    regs: Registers,
    rom_bank: Option<usize>,
    ram_bank: Option<usize>,
    ram_enabled: bool,
}

impl BankController {
    pub fn new(cart: Cartridge) -> Self {
        let regs = match cart.kind {
            MbcKind::None => Registers::None,
            MbcKind::Mbc1 => Registers::Mbc1(Mbc1::new()),
            MbcKind::Mbc3 => Registers::Mbc3(Mbc3::new()),
            MbcKind::Mbc5 => Registers::Mbc5(Mbc5::new()),
        };
        let mut mbc = Self {
            cart,
            regs,
            rom_bank: None,
            ram_bank: None,
            ram_enabled: false,
        };
        mbc.resolve();
        mbc
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cart
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cart
    }

    pub fn into_cartridge(self) -> Cartridge {
        self.cart
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    /// Install a saved register file. Ignored if it belongs to another family.
    pub fn restore_registers(&mut self, regs: Registers) {
        if std::mem::discriminant(&regs) != std::mem::discriminant(&self.regs) {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!("saved {:?} does not match the cartridge", regs)
            });
            return;
        }
        self.regs = regs;
        self.resolve();
    }

    /// Bank visible at 0x4000-0x7FFF
    pub fn rom_bank(&self) -> Option<usize> {
        self.rom_bank
    }

    /// Bank visible at 0xA000-0xBFFF
    pub fn ram_bank(&self) -> Option<usize> {
        self.ram_bank
    }

    pub fn ram_enabled(&self) -> bool {
        self.ram_enabled
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 { Some(0) } else { self.rom_bank };
        bank.and_then(|n| self.cart.rom_bank(n))
            .map_or(0xFF, |data| data[(addr & 0x3FFF) as usize])
    }

    /// Program a controller register.
    pub fn write_rom(&mut self, addr: u16, val: u8) -> WriteStatus {
        let handled = match &mut self.regs {
            Registers::None => false,
            Registers::Mbc1(m) => {
                m.write(addr, val);
                true
            }
            Registers::Mbc3(m) => {
                m.write(addr, val);
                true
            }
            Registers::Mbc5(m) => {
                m.write(addr, val);
                true
            }
        };
        if !handled {
            return WriteStatus::Ignored;
        }
        self.resolve();
        WriteStatus::Ok
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        if let Registers::Mbc3(m) = &self.regs {
            if let Some(val) = m.rtc_read() {
                return val;
            }
        }
        if !self.ram_enabled {
            return 0xFF;
        }
        self.ram_bank
            .and_then(|n| self.cart.ram_bank(n))
            .map_or(0xFF, |data| data[(addr & 0x1FFF) as usize])
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) -> WriteStatus {
        if let Registers::Mbc3(m) = &mut self.regs {
            if m.rtc_write(val) {
                return WriteStatus::Ok;
            }
        }
        if !self.ram_enabled {
            return WriteStatus::Ignored;
        }
        match self.ram_bank.and_then(|n| self.cart.ram_bank_mut(n)) {
            Some(data) => {
                data[(addr & 0x1FFF) as usize] = val;
                WriteStatus::Ok
            }
            None => WriteStatus::Ignored,
        }
    }

    fn resolve(&mut self) {
        let sel = match &self.regs {
            Registers::None => Selection {
                rom: 1,
                ram: 0,
                ram_enabled: true,
            },
            Registers::Mbc1(m) => m.selection(),
            Registers::Mbc3(m) => m.selection(),
            Registers::Mbc5(m) => m.selection(),
        };

        self.rom_bank = self.cart.has_rom_bank(sel.rom).then_some(sel.rom);
        if self.rom_bank.is_none() {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "ROM bank {} selected, cartridge has {}",
                    sel.rom,
                    self.cart.rom_bank_count()
                )
            });
        }

        self.ram_bank = self.cart.has_ram_bank(sel.ram).then_some(sel.ram);
        if self.ram_bank.is_none() && self.cart.ram_bank_count() > 0 {
            log(LogCategory::Cartridge, LogLevel::Warn, || {
                format!(
                    "RAM bank {} selected, cartridge has {}",
                    sel.ram,
                    self.cart.ram_bank_count()
                )
            });
        }
        self.ram_enabled = sel.ram_enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::make_rom;

    fn controller(cart_type: u8, rom_code: u8, ram_code: u8) -> BankController {
        BankController::new(Cartridge::from_bytes(&make_rom(cart_type, rom_code, ram_code)).expect("cart"))
    }

    #[test]
    fn test_no_controller() {
        let mut mbc = controller(0x00, 0, 0);
        assert_eq!(mbc.read_rom(0x0000), 0);
        assert_eq!(mbc.read_rom(0x4000), 1);
        assert_eq!(mbc.write_rom(0x2000, 0x05), WriteStatus::Ignored);
        assert_eq!(mbc.read_rom(0x4000), 1);
        // No RAM on board
        assert_eq!(mbc.read_ram(0xA000), 0xFF);
        assert_eq!(mbc.write_ram(0xA000, 0x12), WriteStatus::Ignored);
    }

    #[test]
    fn test_out_of_range_bank_reads_ff() {
        // 4 banks, select bank 9
        let mut mbc = controller(0x01, 1, 0);
        mbc.write_rom(0x2000, 0x09);
        assert_eq!(mbc.rom_bank(), None);
        assert_eq!(mbc.read_rom(0x4000), 0xFF);
        assert_eq!(mbc.read_rom(0x0000), 0);

        mbc.write_rom(0x2000, 0x03);
        assert_eq!(mbc.rom_bank(), Some(3));
        assert_eq!(mbc.read_rom(0x7FFF), 3);
    }

    #[test]
    fn test_disabled_ram_reads_ff() {
        let mut mbc = controller(0x03, 0, 2);
        assert_eq!(mbc.write_ram(0xA000, 0x42), WriteStatus::Ignored);
        assert_eq!(mbc.read_ram(0xA000), 0xFF);

        mbc.write_rom(0x0000, 0x0A);
        assert_eq!(mbc.write_ram(0xA000, 0x42), WriteStatus::Ok);
        assert_eq!(mbc.read_ram(0xA000), 0x42);

        mbc.write_rom(0x0000, 0x00);
        assert_eq!(mbc.read_ram(0xA000), 0xFF);
        assert_eq!(mbc.cartridge().ram()[0], 0x42);
    }
}
