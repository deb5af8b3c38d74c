//! Instruction execution. Every arm returns its cost in M-cycles.

use super::instruction::{AluOp, Cond, Instruction, ShiftOp, R16, R16Mem, R16Stk, R8};
use super::{CpuLr35902, MemoryLr35902, FLAG_C, FLAG_H, FLAG_N, FLAG_Z, IE_ADDR, IF_ADDR, KEY1_ADDR};
use crate::logging::{log, LogCategory, LogLevel};

/// Extra M-cycles for an `[hl]` operand
fn hl_cost(r: R8) -> u32 {
    if r == R8::HlInd {
        1
    } else {
        0
    }
}

impl<M: MemoryLr35902> CpuLr35902<M> {
    pub(super) fn execute(&mut self, instr: Instruction) -> u32 {
        match instr {
            Instruction::Nop => 1,
            Instruction::Stop => {
                self.stop();
                0
            }
            Instruction::Halt => {
                let pending = self.memory.read(IE_ADDR) & self.memory.read(IF_ADDR) & 0x1F;
                if !self.ime && pending != 0 {
                    self.halt_bug = true;
                } else {
                    self.halted = true;
                }
                1
            }

            Instruction::LdR16Imm(r, v) => {
                self.set_r16(r, v);
                3
            }
            Instruction::LdMemA(m) => {
                let addr = self.r16mem(m);
                self.memory.write(addr, self.a);
                2
            }
            Instruction::LdAMem(m) => {
                let addr = self.r16mem(m);
                self.a = self.memory.read(addr);
                2
            }
            Instruction::LdImm16Sp(addr) => {
                self.memory.write(addr, self.sp as u8);
                self.memory.write(addr.wrapping_add(1), (self.sp >> 8) as u8);
                5
            }
            Instruction::IncR16(r) => {
                self.set_r16(r, self.r16(r).wrapping_add(1));
                2
            }
            Instruction::DecR16(r) => {
                self.set_r16(r, self.r16(r).wrapping_sub(1));
                2
            }
            Instruction::AddHl(r) => {
                self.add_hl(self.r16(r));
                2
            }
            Instruction::IncR8(r) => {
                let val = self.inc(self.read_r8(r));
                self.write_r8(r, val);
                1 + 2 * hl_cost(r)
            }
            Instruction::DecR8(r) => {
                let val = self.dec(self.read_r8(r));
                self.write_r8(r, val);
                1 + 2 * hl_cost(r)
            }
            Instruction::LdR8Imm(r, v) => {
                self.write_r8(r, v);
                2 + hl_cost(r)
            }

            Instruction::Rlca => self.rotate_a(ShiftOp::Rlc),
            Instruction::Rrca => self.rotate_a(ShiftOp::Rrc),
            Instruction::Rla => self.rotate_a(ShiftOp::Rl),
            Instruction::Rra => self.rotate_a(ShiftOp::Rr),
            Instruction::Daa => {
                self.daa();
                1
            }
            Instruction::Cpl => {
                self.a = !self.a;
                self.set_flag(FLAG_N, true);
                self.set_flag(FLAG_H, true);
                1
            }
            Instruction::Scf => {
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, true);
                1
            }
            Instruction::Ccf => {
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_C, !self.get_flag(FLAG_C));
                1
            }

            Instruction::Jr(e) => {
                self.pc = self.pc.wrapping_add(e as i16 as u16);
                3
            }
            Instruction::JrCond(cc, e) => {
                if self.condition(cc) {
                    self.pc = self.pc.wrapping_add(e as i16 as u16);
                    3
                } else {
                    2
                }
            }

            Instruction::LdR8R8(dst, src) => {
                let val = self.read_r8(src);
                self.write_r8(dst, val);
                1 + hl_cost(src) + hl_cost(dst)
            }
            Instruction::Alu(op, r) => {
                let val = self.read_r8(r);
                self.alu(op, val);
                1 + hl_cost(r)
            }
            Instruction::AluImm(op, v) => {
                self.alu(op, v);
                2
            }

            Instruction::Ret => {
                self.pc = self.pop_u16();
                4
            }
            Instruction::RetCond(cc) => {
                if self.condition(cc) {
                    self.pc = self.pop_u16();
                    5
                } else {
                    2
                }
            }
            Instruction::Reti => {
                self.pc = self.pop_u16();
                self.ime = true;
                4
            }
            Instruction::Jp(addr) => {
                self.pc = addr;
                4
            }
            Instruction::JpCond(cc, addr) => {
                if self.condition(cc) {
                    self.pc = addr;
                    4
                } else {
                    3
                }
            }
            Instruction::JpHl => {
                self.pc = self.hl();
                1
            }
            Instruction::Call(addr) => {
                self.push_u16(self.pc);
                self.pc = addr;
                6
            }
            Instruction::CallCond(cc, addr) => {
                if self.condition(cc) {
                    self.push_u16(self.pc);
                    self.pc = addr;
                    6
                } else {
                    3
                }
            }
            Instruction::Rst(vector) => {
                self.push_u16(self.pc);
                self.pc = vector as u16;
                4
            }
            Instruction::Pop(r) => {
                let val = self.pop_u16();
                self.set_r16stk(r, val);
                3
            }
            Instruction::Push(r) => {
                self.push_u16(self.r16stk(r));
                4
            }

            Instruction::LdhCA => {
                self.memory.write(0xFF00 | self.c as u16, self.a);
                2
            }
            Instruction::LdhAC => {
                self.a = self.memory.read(0xFF00 | self.c as u16);
                2
            }
            Instruction::LdhImmA(n) => {
                self.memory.write(0xFF00 | n as u16, self.a);
                3
            }
            Instruction::LdhAImm(n) => {
                self.a = self.memory.read(0xFF00 | n as u16);
                3
            }
            Instruction::LdImm16A(addr) => {
                self.memory.write(addr, self.a);
                4
            }
            Instruction::LdAImm16(addr) => {
                self.a = self.memory.read(addr);
                4
            }

            Instruction::AddSp(e) => {
                self.sp = self.sp_plus(e);
                4
            }
            Instruction::LdHlSp(e) => {
                let val = self.sp_plus(e);
                self.set_hl(val);
                3
            }
            Instruction::LdSpHl => {
                self.sp = self.hl();
                2
            }

            Instruction::Di => {
                self.ime = false;
                self.ei_delay = 0;
                1
            }
            Instruction::Ei => {
                self.ei_delay = 2;
                1
            }

            Instruction::Shift(op, r) => {
                let val = self.shift(op, self.read_r8(r));
                self.write_r8(r, val);
                2 + 2 * hl_cost(r)
            }
            Instruction::Bit(bit, r) => {
                let val = self.read_r8(r);
                self.set_flag(FLAG_Z, val & (1 << bit) == 0);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_H, true);
                2 + hl_cost(r)
            }
            Instruction::Res(bit, r) => {
                let val = self.read_r8(r) & !(1 << bit);
                self.write_r8(r, val);
                2 + 2 * hl_cost(r)
            }
            Instruction::Set(bit, r) => {
                let val = self.read_r8(r) | (1 << bit);
                self.write_r8(r, val);
                2 + 2 * hl_cost(r)
            }

            Instruction::Invalid(op) => {
                let pc = self.pc.wrapping_sub(1);
                log(LogCategory::CPU, LogLevel::Warn, || {
                    format!("undefined opcode {:02X} at {:04X}, skipped", op, pc)
                });
                0
            }
        }
    }

    fn read_r8(&self, r: R8) -> u8 {
        match r {
            R8::B => self.b,
            R8::C => self.c,
            R8::D => self.d,
            R8::E => self.e,
            R8::H => self.h,
            R8::L => self.l,
            R8::HlInd => self.memory.read(self.hl()),
            R8::A => self.a,
        }
    }

    fn write_r8(&mut self, r: R8, val: u8) {
        match r {
            R8::B => self.b = val,
            R8::C => self.c = val,
            R8::D => self.d = val,
            R8::E => self.e = val,
            R8::H => self.h = val,
            R8::L => self.l = val,
            R8::HlInd => self.memory.write(self.hl(), val),
            R8::A => self.a = val,
        }
    }

    fn r16(&self, r: R16) -> u16 {
        match r {
            R16::BC => self.bc(),
            R16::DE => self.de(),
            R16::HL => self.hl(),
            R16::SP => self.sp,
        }
    }

    fn set_r16(&mut self, r: R16, val: u16) {
        match r {
            R16::BC => self.set_bc(val),
            R16::DE => self.set_de(val),
            R16::HL => self.set_hl(val),
            R16::SP => self.sp = val,
        }
    }

    fn r16stk(&self, r: R16Stk) -> u16 {
        match r {
            R16Stk::BC => self.bc(),
            R16Stk::DE => self.de(),
            R16Stk::HL => self.hl(),
            R16Stk::AF => self.af(),
        }
    }

    fn set_r16stk(&mut self, r: R16Stk, val: u16) {
        match r {
            R16Stk::BC => self.set_bc(val),
            R16Stk::DE => self.set_de(val),
            R16Stk::HL => self.set_hl(val),
            R16Stk::AF => self.set_af(val),
        }
    }

    /// Resolve the address and apply the HL post-increment/decrement.
    fn r16mem(&mut self, m: R16Mem) -> u16 {
        match m {
            R16Mem::BC => self.bc(),
            R16Mem::DE => self.de(),
            R16Mem::HLInc => {
                let hl = self.hl();
                self.set_hl(hl.wrapping_add(1));
                hl
            }
            R16Mem::HLDec => {
                let hl = self.hl();
                self.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn condition(&self, cc: Cond) -> bool {
        match cc {
            Cond::NZ => !self.get_flag(FLAG_Z),
            Cond::Z => self.get_flag(FLAG_Z),
            Cond::NC => !self.get_flag(FLAG_C),
            Cond::C => self.get_flag(FLAG_C),
        }
    }

    fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.a;
        let carry = self.get_flag(FLAG_C) as u8;
        match op {
            AluOp::Add | AluOp::Adc => {
                let c = if op == AluOp::Adc { carry } else { 0 };
                let result = a as u16 + val as u16 + c as u16;
                self.set_flag(FLAG_H, (a & 0x0F) + (val & 0x0F) + c > 0x0F);
                self.set_flag(FLAG_C, result > 0xFF);
                self.set_flag(FLAG_N, false);
                self.a = result as u8;
                self.set_flag(FLAG_Z, self.a == 0);
            }
            AluOp::Sub | AluOp::Sbc | AluOp::Cp => {
                let c = if op == AluOp::Sbc { carry } else { 0 };
                let result = a.wrapping_sub(val).wrapping_sub(c);
                self.set_flag(FLAG_H, (a & 0x0F) < (val & 0x0F) + c);
                self.set_flag(FLAG_C, (a as u16) < val as u16 + c as u16);
                self.set_flag(FLAG_N, true);
                self.set_flag(FLAG_Z, result == 0);
                if op != AluOp::Cp {
                    self.a = result;
                }
            }
            AluOp::And => {
                self.a &= val;
                self.f = FLAG_H;
                self.set_flag(FLAG_Z, self.a == 0);
            }
            AluOp::Xor => {
                self.a ^= val;
                self.f = 0;
                self.set_flag(FLAG_Z, self.a == 0);
            }
            AluOp::Or => {
                self.a |= val;
                self.f = 0;
                self.set_flag(FLAG_Z, self.a == 0);
            }
        }
    }

    fn inc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.set_flag(FLAG_H, (val & 0x0F) == 0x0F);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, false);
        result
    }

    fn dec(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.set_flag(FLAG_H, (val & 0x0F) == 0);
        self.set_flag(FLAG_Z, result == 0);
        self.set_flag(FLAG_N, true);
        result
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.hl();
        let result = hl.wrapping_add(val);
        self.set_flag(FLAG_N, false);
        self.set_flag(FLAG_H, (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF);
        self.set_flag(FLAG_C, result < hl);
        self.set_hl(result);
    }

    /// SP + signed offset; H and C come from the unsigned low-byte add.
    fn sp_plus(&mut self, e: i8) -> u16 {
        let sp = self.sp;
        let offset = e as u8;
        self.f = 0;
        self.set_flag(FLAG_H, (sp & 0x0F) as u8 + (offset & 0x0F) > 0x0F);
        self.set_flag(FLAG_C, (sp & 0xFF) + offset as u16 > 0xFF);
        sp.wrapping_add(e as i16 as u16)
    }

    fn daa(&mut self) {
        let mut a = self.a;
        if self.get_flag(FLAG_N) {
            if self.get_flag(FLAG_C) {
                a = a.wrapping_sub(0x60);
            }
            if self.get_flag(FLAG_H) {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if self.get_flag(FLAG_C) || a > 0x99 {
                a = a.wrapping_add(0x60);
                self.set_flag(FLAG_C, true);
            }
            if self.get_flag(FLAG_H) || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }
        self.a = a;
        self.set_flag(FLAG_Z, a == 0);
        self.set_flag(FLAG_H, false);
    }

    /// Accumulator rotates: like the CB forms but Z is always cleared.
    fn rotate_a(&mut self, op: ShiftOp) -> u32 {
        self.a = self.shift(op, self.a);
        self.set_flag(FLAG_Z, false);
        1
    }

    fn shift(&mut self, op: ShiftOp, val: u8) -> u8 {
        let carry_in = self.get_flag(FLAG_C) as u8;
        let (result, carry) = match op {
            ShiftOp::Rlc => (val.rotate_left(1), val & 0x80 != 0),
            ShiftOp::Rrc => (val.rotate_right(1), val & 0x01 != 0),
            ShiftOp::Rl => ((val << 1) | carry_in, val & 0x80 != 0),
            ShiftOp::Rr => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            ShiftOp::Sla => (val << 1, val & 0x80 != 0),
            ShiftOp::Sra => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            ShiftOp::Swap => (val.rotate_left(4), false),
            ShiftOp::Srl => (val >> 1, val & 0x01 != 0),
        };
        self.f = 0;
        self.set_flag(FLAG_C, carry);
        self.set_flag(FLAG_Z, result == 0);
        result
    }

    /// Speed switch. Only acts when KEY1 bit 0 was armed by the program.
    fn stop(&mut self) {
        let key1 = self.memory.read(KEY1_ADDR);
        if key1 & 0x01 == 0 {
            return;
        }
        self.double_speed = !self.double_speed;
        let key1 = if self.double_speed { key1 | 0x80 } else { key1 & 0x7F };
        self.memory.write(KEY1_ADDR, key1 & 0xFE);
        let double = self.double_speed;
        log(LogCategory::CPU, LogLevel::Info, || {
            format!("speed switch: {} speed", if double { "double" } else { "normal" })
        });
    }
}
