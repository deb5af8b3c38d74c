//! OAM DMA and VRAM DMA (HDMA)
//!
//! Both engines only track transfer progress. The bus performs the actual
//! copies because the source can be anywhere in the memory map.
//!
//! # OAM DMA (0xFF46)
//!
//! Writing `n` copies `n*0x100 .. n*0x100+0x9F` into OAM, one byte per
//! M-cycle.
//!
//! # HDMA (0xFF51-0xFF55, color hardware only)
//!
//! - 0xFF51/52: source, low 4 bits ignored
//! - 0xFF53/54: destination offset in VRAM, masked to 0x1FF0
//! - 0xFF55: bits 0-6 length in 16-byte blocks minus one, bit 7 mode
//!
//! In general-purpose mode the whole transfer happens at once. In H-blank
//! mode one block is copied each time the PPU enters H-blank. Each block
//! stalls the CPU for 32 dots.

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

pub const OAM_SIZE: u16 = 0xA0;
pub const HDMA_BLOCK: u16 = 0x10;
/// Dots the CPU is stalled per HDMA block
pub const HDMA_BLOCK_DOTS: u32 = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OamDma {
    pub active: bool,
    pub source: u16,
    pub index: u16,
}

impl OamDma {
    pub fn start(&mut self, val: u8) {
        self.active = true;
        self.source = (val as u16) << 8;
        self.index = 0;
        log(LogCategory::Dma, LogLevel::Debug, || {
            format!("OAM DMA from {:04X}", self.source)
        });
    }

    /// Source address and OAM offset of the next byte to copy, advancing the
    /// transfer. `None` once all 160 bytes are done.
    pub fn next_byte(&mut self) -> Option<(u16, usize)> {
        if !self.active {
            return None;
        }
        let item = (self.source.wrapping_add(self.index), self.index as usize);
        self.index += 1;
        if self.index >= OAM_SIZE {
            self.active = false;
        }
        Some(item)
    }
}

/// A run of 16-byte blocks the bus should copy now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdmaBlock {
    pub source: u16,
    /// Offset into VRAM (0x0000-0x1FFF)
    pub dest: u16,
    pub blocks: u16,
}

impl HdmaBlock {
    pub fn len(&self) -> u16 {
        self.blocks * HDMA_BLOCK
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hdma {
    pub active: bool,
    pub hblank_mode: bool,
    /// Set once the PPU has left H-blank, so the next H-blank gets one block
    pub ready: bool,
    pub source: u16,
    pub dest: u16,
    /// Value read back from 0xFF55
    pub control: u8,
}

impl Default for Hdma {
    fn default() -> Self {
        Self {
            active: false,
            hblank_mode: false,
            ready: false,
            source: 0,
            dest: 0,
            control: 0xFF,
        }
    }
}

impl Hdma {
    /// Handle a write to 0xFF55. `regs` holds the bytes of 0xFF51-0xFF54.
    pub fn write_control(&mut self, val: u8, regs: [u8; 4]) {
        if self.active && val & 0x80 == 0 {
            self.active = false;
            self.control |= 0x80;
            log(LogCategory::Dma, LogLevel::Debug, || {
                format!("HDMA cancelled, {:02X} blocks left", self.control & 0x7F)
            });
            return;
        }

        self.source = u16::from_be_bytes([regs[0], regs[1]]) & 0xFFF0;
        self.dest = u16::from_be_bytes([regs[2], regs[3]]) & 0x1FF0;
        self.hblank_mode = val & 0x80 != 0;
        self.control = val & 0x7F;
        self.ready = false;
        self.active = true;
        log(LogCategory::Dma, LogLevel::Debug, || {
            format!(
                "{} DMA {:04X} -> {:04X}, {} blocks",
                if self.hblank_mode { "H-blank" } else { "General" },
                self.source,
                0x8000 + self.dest,
                self.control as u16 + 1
            )
        });
    }

    /// Blocks due at this point, given the current STAT mode bits.
    pub fn pending(&mut self, stat_mode: u8) -> Option<HdmaBlock> {
        if !self.active {
            return None;
        }

        if !self.hblank_mode {
            let block = HdmaBlock {
                source: self.source,
                dest: self.dest,
                blocks: self.control as u16 + 1,
            };
            self.finish();
            return Some(block);
        }

        if stat_mode != 0 {
            self.ready = true;
            return None;
        }
        if !self.ready {
            return None;
        }

        self.ready = false;
        let block = HdmaBlock {
            source: self.source,
            dest: self.dest,
            blocks: 1,
        };
        self.source = self.source.wrapping_add(HDMA_BLOCK);
        self.dest = (self.dest + HDMA_BLOCK) & 0x1FFF;
        if self.control == 0 {
            self.finish();
        } else {
            self.control -= 1;
        }
        Some(block)
    }

    fn finish(&mut self) {
        self.active = false;
        self.control = 0xFF;
    }
}
