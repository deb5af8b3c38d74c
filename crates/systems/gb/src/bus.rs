//! Game Boy memory bus implementation
//!
//! The bus owns every piece of addressable state except the CPU registers
//! and the PPU's internal line buffers, and decodes addresses for both the
//! CPU ([`MemoryLr35902`]) and the PPU ([`VideoBus`]).
//!
//! # Memory Map
//!
//! ```text
//! $0000-$00FF  Boot ROM overlay (until $FF50 is written)
//! $0200-$08FF  Boot ROM overlay, color hardware only
//! $0000-$3FFF  ROM Bank 0 (16KB, fixed)
//! $4000-$7FFF  ROM Bank 1-N (16KB, switchable via MBC)
//! $8000-$9FFF  Video RAM (8KB) [CGB: 2 banks via $FF4F]
//! $A000-$BFFF  External RAM or MBC3 clock register
//! $C000-$CFFF  Work RAM Bank 0 (4KB)
//! $D000-$DFFF  Work RAM Bank 1 (4KB) [CGB: Banks 1-7 via $FF70]
//! $E000-$FDFF  Echo RAM (mirror of $C000-$DDFF)
//! $FE00-$FE9F  OAM - Object Attribute Memory (160 bytes, 40 sprites × 4 bytes)
//! $FEA0-$FEFF  Not usable, reads $FF
//! $FF00-$FF7F  I/O Registers
//! $FF80-$FFFE  High RAM (127 bytes)
//! $FFFF        Interrupt Enable Register
//! ```
//!
//! # I/O Registers with side effects
//!
//! - `$FF00 (P1)`: only bits 4-5 are writable; a write re-polls the buttons
//! - `$FF04-$FF07`: timer, see [`crate::timer`]
//! - `$FF41 (STAT)`: bits 0-2 are owned by the PPU
//! - `$FF44 (LY)`: read-only
//! - `$FF46 (DMA)`: starts an OAM DMA
//! - `$FF50`: unmaps the boot ROM for good
//!
//! Color hardware only (ignored on monochrome hardware, read as $FF):
//!
//! - `$FF4D (KEY1)`: speed switch request, acted on by `stop`
//! - `$FF4F (VBK)`: VRAM bank, reads back `bank | $FE`
//! - `$FF55 (HDMA5)`: starts or cancels a VRAM DMA
//! - `$FF69 (BCPD)`, `$FF6B (OCPD)`: palette data, index auto-increments
//!   when bit 7 of `$FF68`/`$FF6A` is set
//! - `$FF70 (SVBK)`: WRAM bank, 0 selects 1

use emu_core::cpu_lr35902::MemoryLr35902;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde_json::Value;

use crate::cartridge::Cartridge;
use crate::dma::{Hdma, OamDma, HDMA_BLOCK_DOTS};
use crate::interrupts::Interrupt;
use crate::joypad::{Buttons, InputSource, Joypad, NoInput};
use crate::mbc::{BankController, Registers, WriteStatus};
use crate::palette::{ColorPalette, DmgPalette};
use crate::ppu::VideoBus;

const VRAM_BANK_SIZE: usize = 0x2000;
const WRAM_BANK_SIZE: usize = 0x1000;

/// I/O values the boot ROM leaves behind on color hardware
const POST_BOOT_COLOR: &[(u16, u8)] = &[
    (0xFF00, 0xCF),
    (0xFF01, 0x00),
    (0xFF02, 0x7F),
    (0xFF04, 0x00),
    (0xFF05, 0x00),
    (0xFF06, 0x00),
    (0xFF07, 0xF8),
    (0xFF0F, 0xE1),
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF13, 0xFF),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF17, 0x00),
    (0xFF18, 0xFF),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1D, 0xFF),
    (0xFF1E, 0xBF),
    (0xFF20, 0xFF),
    (0xFF21, 0x00),
    (0xFF22, 0x00),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
    (0xFF26, 0xF1),
    (0xFF40, 0x91),
    (0xFF41, 0x00),
    (0xFF42, 0x00),
    (0xFF43, 0x00),
    (0xFF44, 0x00),
    (0xFF45, 0x00),
    (0xFF46, 0x00),
    (0xFF47, 0xFC),
    (0xFF48, 0x00),
    (0xFF49, 0x00),
    (0xFF4A, 0x00),
    (0xFF4B, 0x00),
    (0xFF4D, 0x7E),
    (0xFF4F, 0xFE),
    (0xFF51, 0xFF),
    (0xFF52, 0xFF),
    (0xFF53, 0xFF),
    (0xFF54, 0xFF),
    (0xFF55, 0xFF),
    (0xFF56, 0x3E),
    (0xFF68, 0x00),
    (0xFF69, 0x00),
    (0xFF6A, 0x00),
    (0xFF6B, 0x00),
    (0xFF70, 0xF8),
];

/// Monochrome values that differ from the color table; color-only
/// registers are skipped.
const POST_BOOT_DMG_OVERRIDES: &[(u16, u8)] = &[
    (0xFF02, 0x7E),
    (0xFF04, 0xAB),
    (0xFF41, 0x85),
    (0xFF46, 0xFF),
];

fn is_color_only(addr: u16) -> bool {
    matches!(addr, 0xFF4D | 0xFF4F | 0xFF51..=0xFF56 | 0xFF68..=0xFF6B | 0xFF70)
}

/// Game Boy memory bus
pub struct GbBus {
    /// Color hardware
    color: bool,
    mbc: Option<BankController>,
    boot_rom: Option<Vec<u8>>,
    booting: bool,

    vram: Vec<u8>,
    vram_bank: usize,
    wram: Vec<u8>,
    wram_bank: usize,
    oam: [u8; 0xA0],
    io: [u8; 0x80],
    hram: [u8; 0x7F],
    ie: u8,

    pub timer: crate::timer::Timer,
    pub oam_dma: OamDma,
    pub hdma: Hdma,
    pub joypad: Joypad,
    input: Box<dyn InputSource>,
    pub bg_palette: ColorPalette,
    pub obj_palette: ColorPalette,
}

impl GbBus {
    /// Power-on bus. With a boot ROM the overlay is mapped; without one the
    /// I/O registers are set to their post-boot values.
    pub fn new(color: bool, cart: Option<Cartridge>, boot_rom: Option<Vec<u8>>) -> Self {
        let booting = boot_rom.is_some();
        let mut bus = Self {
            color,
            mbc: cart.map(BankController::new),
            boot_rom,
            booting,
            vram: vec![0; VRAM_BANK_SIZE * 2],
            vram_bank: 0,
            wram: vec![0; WRAM_BANK_SIZE * 8],
            wram_bank: 1,
            oam: [0; 0xA0],
            io: [0; 0x80],
            hram: [0; 0x7F],
            ie: 0,
            timer: crate::timer::Timer::new(),
            oam_dma: OamDma::default(),
            hdma: Hdma::default(),
            joypad: Joypad::default(),
            input: Box::new(NoInput),
            bg_palette: ColorPalette::new(),
            obj_palette: ColorPalette::new(),
        };
        if !booting {
            bus.apply_post_boot_io();
        }
        bus
    }

    /// Load the register values the boot ROM would have left, bypassing
    /// write side effects.
    pub fn apply_post_boot_io(&mut self) {
        self.booting = false;
        for &(addr, val) in POST_BOOT_COLOR {
            if !self.color && is_color_only(addr) {
                continue;
            }
            let val = if self.color {
                val
            } else {
                POST_BOOT_DMG_OVERRIDES
                    .iter()
                    .find(|(a, _)| *a == addr)
                    .map_or(val, |&(_, v)| v)
            };
            self.poke_io(addr, val);
        }
        self.ie = 0x00;
    }

    /// Seed the ARGB caches used in compatibility mode, where no boot ROM
    /// programmed the color palettes.
    pub fn seed_compat_palettes(&mut self, shades: DmgPalette) {
        self.bg_palette.seed(0, shades.0);
        self.obj_palette.seed(0, shades.0);
        self.obj_palette.seed(1, shades.0);
    }

    fn poke_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            0xFF55 => self.hdma.control = val,
            0xFF4F => {
                self.vram_bank = (val & 0x01) as usize;
                self.io[0x4F] = val | 0xFE;
            }
            0xFF70 => {
                self.wram_bank = ((val & 0x07) as usize).max(1);
                self.io[0x70] = val;
            }
            _ => self.io[(addr - 0xFF00) as usize] = val,
        }
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.mbc.as_ref().map(BankController::cartridge)
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.mbc.as_mut().map(BankController::cartridge_mut)
    }

    /// Tear down the bus, keeping the cartridge and its RAM.
    pub fn into_cartridge(self) -> Option<Cartridge> {
        self.mbc.map(BankController::into_cartridge)
    }

    pub fn mbc(&self) -> Option<&BankController> {
        self.mbc.as_ref()
    }

    pub fn is_booting(&self) -> bool {
        self.booting
    }

    pub fn set_input_source(&mut self, input: Box<dyn InputSource>) {
        self.input = input;
    }

    pub fn take_input_source(&mut self) -> Box<dyn InputSource> {
        std::mem::replace(&mut self.input, Box::new(NoInput))
    }

    pub fn request_interrupt(&mut self, irq: Interrupt) {
        self.io[0x0F] |= irq.bit();
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("request {:?}", irq)
        });
    }

    /// Poll the input source and update JOYP, requesting the joypad
    /// interrupt on a new press. Returns the polled state.
    pub fn refresh_joypad(&mut self) -> Buttons {
        self.joypad.buttons = self.input.poll();
        let (joyp, pressed) = self.joypad.refresh(self.io[0x00]);
        self.io[0x00] = joyp;
        if pressed {
            self.request_interrupt(Interrupt::Joypad);
        }
        self.joypad.buttons
    }

    /// Run the OAM DMA for `cycles` M-cycles.
    pub fn step_oam_dma(&mut self, cycles: u32) {
        for _ in 0..cycles {
            let Some((src, index)) = self.oam_dma.next_byte() else {
                break;
            };
            self.oam[index] = self.read(src);
        }
    }

    /// Run the timer for `cycles` M-cycles.
    pub fn step_timer(&mut self, cycles: u32) {
        if self.timer.step(cycles) {
            self.request_interrupt(Interrupt::Timer);
        }
    }

    pub fn hdma_active(&self) -> bool {
        self.hdma.active
    }

    /// Copy whatever HDMA blocks are due. Returns the M-cycles the CPU is
    /// stalled for, or `None` if nothing was copied.
    pub fn hdma_step(&mut self, dots_per_cycle: u32) -> Option<u32> {
        let block = self.hdma.pending(self.io[0x41] & 0x03)?;
        let bank = self.vram_bank * VRAM_BANK_SIZE;
        for i in 0..block.len() {
            let val = self.read(block.source.wrapping_add(i));
            let dest = (block.dest + i) as usize & (VRAM_BANK_SIZE - 1);
            self.vram[bank + dest] = val;
        }
        Some(block.blocks as u32 * HDMA_BLOCK_DOTS / dots_per_cycle)
    }

    fn boot_byte(&self, addr: u16) -> Option<u8> {
        if !self.booting {
            return None;
        }
        let rom = self.boot_rom.as_ref()?;
        let mapped = addr < 0x0100 || (self.color && (0x0200..0x0900).contains(&addr));
        if mapped {
            rom.get(addr as usize).copied()
        } else {
            None
        }
    }

    pub fn read_io(&self, addr: u16) -> u8 {
        if !self.color && is_color_only(addr) {
            return 0xFF;
        }
        match addr {
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            0xFF55 => self.hdma.control,
            0xFF69 => self.bg_palette.read(self.io[0x68]),
            0xFF6B => self.obj_palette.read(self.io[0x6A]),
            _ => self.io[(addr - 0xFF00) as usize],
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) -> WriteStatus {
        if !self.color && is_color_only(addr) {
            log(LogCategory::Bus, LogLevel::Debug, || {
                format!("color-only register {:04X} written on monochrome hardware", addr)
            });
            return WriteStatus::Ignored;
        }

        let reg = (addr - 0xFF00) as usize;
        match addr {
            0xFF00 => {
                self.io[0x00] = (val & 0x30) | (self.io[0x00] & 0x0F);
                self.refresh_joypad();
            }
            0xFF04..=0xFF07 => self.timer.write_register(addr, val),
            // Serial and sound are not emulated; keep the byte so reads see it
            0xFF01..=0xFF02 | 0xFF10..=0xFF3F => {
                log(LogCategory::Stubs, LogLevel::Trace, || {
                    format!("unemulated register {:04X} <- {:02X}", addr, val)
                });
                self.io[reg] = val;
            }
            0xFF41 => self.io[0x41] = (self.io[0x41] & 0x07) | (val & 0xF8),
            0xFF44 => return WriteStatus::Ignored,
            0xFF46 => {
                self.io[reg] = val;
                self.oam_dma.start(val);
            }
            0xFF4F => {
                self.vram_bank = (val & 0x01) as usize;
                self.io[reg] = (val & 0x01) | 0xFE;
            }
            0xFF50 => {
                self.io[reg] = val;
                if self.booting {
                    log(LogCategory::Bus, LogLevel::Info, || "boot ROM unmapped".to_string());
                }
                self.booting = false;
            }
            0xFF55 => {
                let regs = [self.io[0x51], self.io[0x52], self.io[0x53], self.io[0x54]];
                self.hdma.write_control(val, regs);
            }
            0xFF69 => {
                let index = self.palette_index(0x68);
                self.bg_palette.write(index, val);
            }
            0xFF6B => {
                let index = self.palette_index(0x6A);
                self.obj_palette.write(index, val);
            }
            0xFF70 => {
                self.wram_bank = ((val & 0x07) as usize).max(1);
                self.io[reg] = val;
            }
            _ => self.io[reg] = val,
        }
        WriteStatus::Ok
    }

    /// Current index of a palette spec register, auto-incrementing it if
    /// bit 7 asks for that.
    fn palette_index(&mut self, spec: usize) -> u8 {
        let value = self.io[spec];
        if value & 0x80 != 0 {
            self.io[spec] = (value.wrapping_add(1)) & 0xBF;
        }
        value & 0x3F
    }

    /// Write and report whether the byte landed anywhere.
    pub fn write_checked(&mut self, addr: u16, val: u8) -> WriteStatus {
        match addr {
            0x0000..=0x7FFF => match &mut self.mbc {
                Some(mbc) => mbc.write_rom(addr, val),
                None => WriteStatus::Ignored,
            },
            0x8000..=0x9FFF => {
                self.vram[self.vram_bank * VRAM_BANK_SIZE + (addr - 0x8000) as usize] = val;
                WriteStatus::Ok
            }
            0xA000..=0xBFFF => match &mut self.mbc {
                Some(mbc) => mbc.write_ram(addr, val),
                None => WriteStatus::Ignored,
            },
            0xC000..=0xCFFF => {
                self.wram[(addr - 0xC000) as usize] = val;
                WriteStatus::Ok
            }
            0xD000..=0xDFFF => {
                self.wram[self.wram_bank * WRAM_BANK_SIZE + (addr - 0xD000) as usize] = val;
                WriteStatus::Ok
            }
            0xE000..=0xFDFF => self.write_checked(addr - 0x2000, val),
            0xFE00..=0xFE9F => {
                self.oam[(addr - 0xFE00) as usize] = val;
                WriteStatus::Ok
            }
            0xFEA0..=0xFEFF => WriteStatus::Ignored,
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => {
                self.hram[(addr - 0xFF80) as usize] = val;
                WriteStatus::Ok
            }
            0xFFFF => {
                self.ie = val;
                WriteStatus::Ok
            }
        }
    }

    /// Snapshot of memory and peripheral state. ROM contents are not included.
    pub fn save_state(&self) -> Value {
        serde_json::json!({
            "booting": self.booting,
            "vram": self.vram,
            "vram_bank": self.vram_bank,
            "wram": self.wram,
            "wram_bank": self.wram_bank,
            "oam": self.oam.to_vec(),
            "io": self.io.to_vec(),
            "hram": self.hram.to_vec(),
            "ie": self.ie,
            "timer": serde_json::to_value(&self.timer).unwrap_or_default(),
            "oam_dma": serde_json::to_value(&self.oam_dma).unwrap_or_default(),
            "hdma": serde_json::to_value(&self.hdma).unwrap_or_default(),
            "bg_palette": self.bg_palette.data.to_vec(),
            "obj_palette": self.obj_palette.data.to_vec(),
            "mbc": self.mbc.as_ref().map(|m| serde_json::to_value(m.registers()).unwrap_or_default()),
            "cart_ram": self.cartridge().map(Cartridge::ram),
        })
    }

    pub fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        fn bytes(v: &Value, field: &str, target: &mut [u8]) -> Result<(), serde_json::Error> {
            if let Some(data) = v.get(field) {
                let data: Vec<u8> = serde_json::from_value(data.clone())?;
                if data.len() != target.len() {
                    return Err(serde::de::Error::invalid_length(data.len(), &field));
                }
                target.copy_from_slice(&data);
            }
            Ok(())
        }

        bytes(v, "vram", &mut self.vram)?;
        bytes(v, "wram", &mut self.wram)?;
        bytes(v, "oam", &mut self.oam)?;
        bytes(v, "io", &mut self.io)?;
        bytes(v, "hram", &mut self.hram)?;

        if let Some(b) = v.get("booting").and_then(Value::as_bool) {
            self.booting = b && self.boot_rom.is_some();
        }
        if let Some(n) = v.get("vram_bank").and_then(Value::as_u64) {
            self.vram_bank = (n & 1) as usize;
        }
        if let Some(n) = v.get("wram_bank").and_then(Value::as_u64) {
            self.wram_bank = ((n & 7) as usize).max(1);
        }
        if let Some(n) = v.get("ie").and_then(Value::as_u64) {
            self.ie = n as u8;
        }
        if let Some(t) = v.get("timer") {
            self.timer = serde_json::from_value(t.clone())?;
        }
        if let Some(d) = v.get("oam_dma") {
            self.oam_dma = serde_json::from_value(d.clone())?;
        }
        if let Some(h) = v.get("hdma") {
            self.hdma = serde_json::from_value(h.clone())?;
        }

        let mut palette = [0u8; 64];
        for (field, is_bg) in [("bg_palette", true), ("obj_palette", false)] {
            if v.get(field).is_none() {
                continue;
            }
            bytes(v, field, &mut palette)?;
            let target = if is_bg { &mut self.bg_palette } else { &mut self.obj_palette };
            for (i, &b) in palette.iter().enumerate() {
                target.write(i as u8, b);
            }
        }

        if let Some(mbc) = self.mbc.as_mut() {
            if let Some(regs) = v.get("mbc").filter(|r| !r.is_null()) {
                let regs: Registers = serde_json::from_value(regs.clone())?;
                mbc.restore_registers(regs);
            }
            if let Some(ram) = v.get("cart_ram").filter(|r| !r.is_null()) {
                let ram: Vec<u8> = serde_json::from_value(ram.clone())?;
                mbc.cartridge_mut()
                    .load_ram(&ram)
                    .map_err(<serde_json::Error as serde::de::Error>::custom)?;
            }
        }
        Ok(())
    }
}

impl MemoryLr35902 for GbBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(val) = self.boot_byte(addr) {
                    val
                } else if let Some(mbc) = &self.mbc {
                    mbc.read_rom(addr)
                } else {
                    0xFF
                }
            }
            0x8000..=0x9FFF => self.vram[self.vram_bank * VRAM_BANK_SIZE + (addr - 0x8000) as usize],
            0xA000..=0xBFFF => self.mbc.as_ref().map_or(0xFF, |mbc| mbc.read_ram(addr)),
            0xC000..=0xCFFF => self.wram[(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[self.wram_bank * WRAM_BANK_SIZE + (addr - 0xD000) as usize],
            0xE000..=0xFDFF => self.read(addr - 0x2000),
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        if self.write_checked(addr, val) == WriteStatus::Ignored {
            log(LogCategory::Bus, LogLevel::Debug, || {
                format!("write {:02X} to {:04X} ignored", val, addr)
            });
        }
    }
}

impl VideoBus for GbBus {
    fn read_io(&self, addr: u16) -> u8 {
        GbBus::read_io(self, addr)
    }

    fn set_ly(&mut self, ly: u8) {
        self.io[0x44] = ly;
    }

    fn override_stat(&mut self, stat: u8) {
        self.io[0x41] = stat;
    }

    fn request_interrupt(&mut self, irq: Interrupt) {
        GbBus::request_interrupt(self, irq);
    }

    fn read_vram(&self, addr: u16, bank: usize) -> u8 {
        self.vram[(bank & 1) * VRAM_BANK_SIZE + (addr as usize & (VRAM_BANK_SIZE - 1))]
    }

    fn read_oam(&self, offset: usize) -> u8 {
        self.oam.get(offset).copied().unwrap_or(0xFF)
    }

    fn bg_color(&self, index: usize) -> u32 {
        self.bg_palette.argb[index & 0x1F]
    }

    fn obj_color(&self, index: usize) -> u32 {
        self.obj_palette.argb[index & 0x1F]
    }
}
