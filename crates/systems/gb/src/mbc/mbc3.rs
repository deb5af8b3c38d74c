//! MBC3
//!
//! # Register Map
//!
//! - 0x0000-0x1FFF: RAM and Timer Enable (low nibble 0x0A enables RAM)
//! - 0x2000-0x3FFF: ROM Bank Number (7 bits, 0 reads as 1)
//! - 0x4000-0x5FFF: RAM Bank Number (0-3) or RTC Register Select (0x08-0x0C)
//! - 0x6000-0x7FFF: Latch Clock Data (write 0x00 then 0x01 to latch)
//!
//! # RTC Registers
//!
//! - 0x08: Seconds
//! - 0x09: Minutes
//! - 0x0A: Hours
//! - 0x0B: Day counter, low 8 bits
//! - 0x0C: Day counter bit 8
//!
//! The clock is not emulated: latching copies the host's local time into the
//! registers. While an RTC register is selected the A000-BFFF window maps to
//! it, whether or not RAM is enabled.

use chrono::{Datelike, Local, Timelike};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

use super::Selection;

/// Latched clock registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rtc {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_low: u8,
    pub day_high: u8,
}

impl Rtc {
    /// Capture the host's current local time.
    pub fn latch(&mut self) {
        self.latch_from(&Local::now().naive_local());
    }

    pub fn latch_from<T: Datelike + Timelike>(&mut self, now: &T) {
        let mut seconds = now.second();
        if seconds > 59 {
            seconds -= 60;
        }
        let years = (now.year() - 1900).max(0) as u32;
        let days = (now.ordinal0() + 365 * years) % 512;

        self.seconds = seconds as u8;
        self.minutes = now.minute() as u8;
        self.hours = now.hour() as u8;
        self.day_low = (days & 0xFF) as u8;
        self.day_high = ((days >> 8) & 0x01) as u8;
    }

    /// Register selected by 0x08-0x0C
    pub fn read(&self, select: u8) -> Option<u8> {
        match select {
            0x08 => Some(self.seconds),
            0x09 => Some(self.minutes),
            0x0A => Some(self.hours),
            0x0B => Some(self.day_low),
            0x0C => Some(self.day_high),
            _ => None,
        }
    }

    pub fn write(&mut self, select: u8, val: u8) {
        match select {
            0x08 => self.seconds = val,
            0x09 => self.minutes = val,
            0x0A => self.hours = val,
            0x0B => self.day_low = val,
            0x0C => self.day_high = val,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbc3 {
    pub ram_enable: u8,
    pub rom_bank: u8,
    /// RAM bank (0-3) or RTC register (> 3)
    pub select: u8,
    /// Last value written to the latch register
    pub latch: u8,
    pub rtc: Rtc,
}

impl Default for Mbc3 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mbc3 {
    pub fn new() -> Self {
        Self {
            ram_enable: 0,
            rom_bank: 1,
            select: 0,
            latch: 0xFF,
            rtc: Rtc::default(),
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val,
            0x2000..=0x3FFF => {
                let bank = val & 0x7F;
                self.rom_bank = if bank == 0 { 1 } else { bank };
            }
            0x4000..=0x5FFF => self.select = val,
            0x6000..=0x7FFF => {
                if self.latch == 0x00 && val == 0x01 {
                    self.rtc.latch();
                    log(LogCategory::Cartridge, LogLevel::Debug, || {
                        format!("RTC latched {:?}", self.rtc)
                    });
                }
                self.latch = val;
            }
            _ => {}
        }
    }

    /// True when the external RAM window currently shows an RTC register
    pub fn rtc_selected(&self) -> bool {
        self.select > 0x03
    }

    pub(crate) fn rtc_read(&self) -> Option<u8> {
        if !self.rtc_selected() {
            return None;
        }
        Some(self.rtc.read(self.select).unwrap_or(0xFF))
    }

    /// Returns false when the write should go to RAM instead.
    pub(crate) fn rtc_write(&mut self, val: u8) -> bool {
        if !self.rtc_selected() {
            return false;
        }
        self.rtc.write(self.select, val);
        true
    }

    pub(crate) fn selection(&self) -> Selection {
        Selection {
            rom: self.rom_bank as usize,
            ram: if self.rtc_selected() { 0 } else { self.select as usize },
            ram_enabled: self.ram_enable & 0x0F == 0x0A,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{BankController, Registers, WriteStatus};
    use super::*;
    use crate::cartridge::{tests::make_rom, Cartridge};
    use chrono::NaiveDate;

    fn mbc3() -> BankController {
        let rom = make_rom(0x10, 6, 3);
        BankController::new(Cartridge::from_bytes(&rom).expect("cart"))
    }

    #[test]
    fn test_mbc3_rom_banking() {
        let mut mbc = mbc3();
        assert_eq!(mbc.read_rom(0x4000), 1);

        mbc.write_rom(0x2000, 0x7F);
        assert_eq!(mbc.read_rom(0x4000), 127);

        mbc.write_rom(0x2000, 0x80);
        assert_eq!(mbc.read_rom(0x4000), 1);
    }

    #[test]
    fn test_mbc3_ram_banks() {
        let mut mbc = mbc3();
        mbc.write_rom(0x0000, 0x0A);
        for bank in 0..4u8 {
            mbc.write_rom(0x4000, bank);
            assert_eq!(mbc.write_ram(0xA000, 0x10 + bank), WriteStatus::Ok);
        }
        mbc.write_rom(0x4000, 2);
        assert_eq!(mbc.read_ram(0xA000), 0x12);
    }

    #[test]
    fn test_mbc3_rtc_window() {
        let mut mbc = mbc3();
        mbc.write_rom(0x4000, 0x08);
        assert_eq!(mbc.write_ram(0xA000, 42), WriteStatus::Ok);
        // Visible without enabling RAM
        assert_eq!(mbc.read_ram(0xA000), 42);

        // Unused selectors read open bus
        mbc.write_rom(0x4000, 0x05);
        assert_eq!(mbc.read_ram(0xA000), 0xFF);

        // RAM was not touched
        assert!(mbc.cartridge().ram().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mbc3_latch_sequence() {
        let mut mbc = mbc3();
        mbc.write_rom(0x4000, 0x0B);
        mbc.write_ram(0xA000, 0xEE);

        // 0x01 without a preceding 0x00 does not latch
        mbc.write_rom(0x6000, 0x01);
        assert_eq!(mbc.read_ram(0xA000), 0xEE);

        mbc.write_rom(0x6000, 0x00);
        mbc.write_rom(0x6000, 0x01);
        match mbc.registers() {
            Registers::Mbc3(m) => assert!(m.rtc.day_high <= 1),
            other => panic!("unexpected registers {:?}", other),
        }
    }

    #[test]
    fn test_rtc_latch_from_fixed_time() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(13, 45, 30))
            .expect("valid date");
        let mut rtc = Rtc::default();
        rtc.latch_from(&t);

        assert_eq!(rtc.seconds, 30);
        assert_eq!(rtc.minutes, 45);
        assert_eq!(rtc.hours, 13);
        // 2024-03-01 is day 60 (0-based) of a leap year
        let days = (60 + 365 * 124) % 512;
        assert_eq!(rtc.day_low, (days & 0xFF) as u8);
        assert_eq!(rtc.day_high, (days >> 8) as u8 & 1);
    }
}
