//! Sharp LR35902 CPU core (Game Boy / Game Boy Color CPU)
//!
//! A Z80-like CPU with the index registers and shadow set removed. Each
//! [`CpuLr35902::step`] fetches, decodes ([`instruction::decode`]) and
//! executes one instruction and returns its cost in M-cycles. Interrupt
//! dispatch is a separate call so the machine can interleave timers, DMA and
//! video between an instruction and the next dispatch.

mod execute;
pub mod instruction;

use crate::logging::{self, log, LogCategory, LogLevel};
pub use instruction::{decode, Instruction};

/// Memory interface trait for the LR35902 CPU
pub trait MemoryLr35902 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);
}

// Flag bit positions (in F register)
pub const FLAG_Z: u8 = 0b1000_0000;
pub const FLAG_N: u8 = 0b0100_0000;
pub const FLAG_H: u8 = 0b0010_0000;
pub const FLAG_C: u8 = 0b0001_0000;

pub const IF_ADDR: u16 = 0xFF0F;
pub const IE_ADDR: u16 = 0xFFFF;
pub const KEY1_ADDR: u16 = 0xFF4D;

/// Interrupt dispatch costs five M-cycles.
pub const DISPATCH_CYCLES: u32 = 5;

/// Sharp LR35902 CPU state
#[derive(Debug)]
pub struct CpuLr35902<M: MemoryLr35902> {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    /// Interrupt Master Enable
    pub ime: bool,
    pub halted: bool,
    /// Set by `halt` with IME off and an interrupt already pending: the next
    /// opcode byte is read twice.
    pub halt_bug: bool,
    /// Steps left until a pending `ei` takes effect (0 = none pending)
    pub ei_delay: u8,
    /// Colour hardware double-speed mode
    pub double_speed: bool,
    /// Total M-cycles executed, dispatch included
    pub cycles: u64,
    pub memory: M,
}

impl<M: MemoryLr35902> CpuLr35902<M> {
    pub fn new(memory: M) -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
            ime: false,
            halted: false,
            halt_bug: false,
            ei_delay: 0,
            double_speed: false,
            cycles: 0,
            memory,
        }
    }

    /// Power-on state: everything zero, execution starts in the boot ROM at 0x0000.
    pub fn reset(&mut self) {
        self.a = 0;
        self.f = 0;
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.e = 0;
        self.h = 0;
        self.l = 0;
        self.sp = 0;
        self.pc = 0;
        self.ime = false;
        self.halted = false;
        self.halt_bug = false;
        self.ei_delay = 0;
        self.double_speed = false;
        self.cycles = 0;
    }

    /// Register values the boot ROM leaves behind, for starting directly at 0x0100.
    pub fn skip_boot(&mut self, color: bool) {
        if color {
            self.set_af(0x1180);
            self.set_bc(0x0000);
            self.set_de(0xFF56);
            self.set_hl(0x000D);
        } else {
            self.set_af(0x0100);
            self.set_bc(0xFF13);
            self.set_de(0x00C1);
            self.set_hl(0x8403);
        }
        self.pc = 0x0100;
        self.sp = 0xFFFE;
    }

    /// Video dots per M-cycle: 4 at normal speed, 2 in double speed.
    pub fn dots_per_cycle(&self) -> u32 {
        if self.double_speed {
            2
        } else {
            4
        }
    }

    /// Execute one instruction and return its M-cycle cost. A halted CPU idles
    /// for one M-cycle.
    pub fn step(&mut self) -> u32 {
        if self.halted {
            self.cycles += 1;
            return 1;
        }

        let pc = self.pc;
        let opcode = self.read_pc();
        if self.halt_bug {
            self.pc = self.pc.wrapping_sub(1);
            self.halt_bug = false;
        }
        let instr = decode(opcode, || self.read_pc());

        if logging::enabled(LogCategory::CPU, LogLevel::Trace) {
            let regs = self.register_summary();
            log(LogCategory::CPU, LogLevel::Trace, || {
                format!("{:04X}: {:<20} {}", pc, instr.to_string(), regs)
            });
        }

        let cycles = self.execute(instr);
        self.cycles += cycles as u64;
        cycles
    }

    /// Advance the `ei` countdown; IME turns on once it reaches zero.
    pub fn ei_post_execute(&mut self) {
        if self.ei_delay > 0 {
            self.ei_delay -= 1;
            if self.ei_delay == 0 {
                self.ime = true;
            }
        }
    }

    /// True when some enabled source is requested, regardless of IME.
    pub fn interrupt_pending(&self) -> bool {
        self.memory.read(IE_ADDR) & self.memory.read(IF_ADDR) & 0x1F != 0
    }

    /// Wake from halt on any pending interrupt and, with IME set, service the
    /// highest-priority one. Returns the M-cycles spent (0 or 5).
    pub fn dispatch_next(&mut self) -> u32 {
        let flags = self.memory.read(IF_ADDR);
        let pending = self.memory.read(IE_ADDR) & flags & 0x1F;
        if pending == 0 {
            return 0;
        }
        self.halted = false;
        if !self.ime {
            return 0;
        }

        // `ei; halt` with a request already pending: return to the halt
        if self.halt_bug {
            self.halt_bug = false;
            self.pc = self.pc.wrapping_sub(1);
        }

        let bit = pending.trailing_zeros() as u16;
        self.ime = false;
        self.memory.write(IF_ADDR, flags & !(1 << bit));
        self.push_u16(self.pc);
        let from = self.pc;
        self.pc = 0x40 + bit * 8;
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!("dispatch bit {} from {:04X} to {:04X}", bit, from, 0x40 + bit * 8)
        });
        self.cycles += DISPATCH_CYCLES as u64;
        DISPATCH_CYCLES
    }

    fn register_summary(&self) -> String {
        format!(
            "AF={:04X} BC={:04X} DE={:04X} HL={:04X} SP={:04X}",
            self.af(),
            self.bc(),
            self.de(),
            self.hl(),
            self.sp
        )
    }

    fn read_pc(&mut self) -> u8 {
        let val = self.memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn push_u16(&mut self, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.memory.write(self.sp, val as u8);
    }

    fn pop_u16(&mut self) -> u16 {
        let lo = self.memory.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.memory.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | (self.c as u16)
    }

    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | (self.e as u16)
    }

    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | (self.l as u16)
    }

    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | (self.f as u16)
    }

    /// Low nibble of F does not exist in hardware.
    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8 & 0xF0;
    }

    fn set_flag(&mut self, flag: u8, val: bool) {
        if val {
            self.f |= flag;
        } else {
            self.f &= !flag;
        }
    }

    pub fn get_flag(&self, flag: u8) -> bool {
        (self.f & flag) != 0
    }
}

impl<M: MemoryLr35902> crate::Cpu for CpuLr35902<M> {
    fn reset(&mut self) {
        self.reset();
    }

    fn step(&mut self) -> u32 {
        self.step()
    }
}
