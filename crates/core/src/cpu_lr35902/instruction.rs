//! LR35902 instruction decoding.
//!
//! [`decode`] turns an opcode plus its immediate bytes into an [`Instruction`]
//! without touching CPU state. The `Display` impl renders assembler syntax and
//! is only used for tracing.

use std::fmt;

/// 8-bit operand in the 3-bit register field. `HlInd` is the byte at `[hl]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R8 {
    B,
    C,
    D,
    E,
    H,
    L,
    HlInd,
    A,
}

impl R8 {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => R8::B,
            1 => R8::C,
            2 => R8::D,
            3 => R8::E,
            4 => R8::H,
            5 => R8::L,
            6 => R8::HlInd,
            _ => R8::A,
        }
    }
}

/// Register pair used by 16-bit loads and arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16 {
    BC,
    DE,
    HL,
    SP,
}

impl R16 {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => R16::BC,
            1 => R16::DE,
            2 => R16::HL,
            _ => R16::SP,
        }
    }
}

/// Register pair used by push/pop; AF takes the place of SP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16Stk {
    BC,
    DE,
    HL,
    AF,
}

impl R16Stk {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => R16Stk::BC,
            1 => R16Stk::DE,
            2 => R16Stk::HL,
            _ => R16Stk::AF,
        }
    }
}

/// Indirect address for `ld [r16],a` / `ld a,[r16]`. The HL forms post-adjust HL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16Mem {
    BC,
    DE,
    HLInc,
    HLDec,
}

impl R16Mem {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => R16Mem::BC,
            1 => R16Mem::DE,
            2 => R16Mem::HLInc,
            _ => R16Mem::HLDec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    NZ,
    Z,
    NC,
    C,
}

impl Cond {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Cond::NZ,
            1 => Cond::Z,
            2 => Cond::NC,
            _ => Cond::C,
        }
    }
}

/// Accumulator operation from block 2 and the `op a,imm8` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }
}

/// CB-prefixed rotate/shift group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl ShiftOp {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => ShiftOp::Rlc,
            1 => ShiftOp::Rrc,
            2 => ShiftOp::Rl,
            3 => ShiftOp::Rr,
            4 => ShiftOp::Sla,
            5 => ShiftOp::Sra,
            6 => ShiftOp::Swap,
            _ => ShiftOp::Srl,
        }
    }
}

/// A fully decoded instruction, immediates included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Stop,
    Halt,
    LdR16Imm(R16, u16),
    LdMemA(R16Mem),
    LdAMem(R16Mem),
    LdImm16Sp(u16),
    IncR16(R16),
    DecR16(R16),
    AddHl(R16),
    IncR8(R8),
    DecR8(R8),
    LdR8Imm(R8, u8),
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jr(i8),
    JrCond(Cond, i8),
    /// Destination first
    LdR8R8(R8, R8),
    Alu(AluOp, R8),
    AluImm(AluOp, u8),
    Ret,
    RetCond(Cond),
    Reti,
    Jp(u16),
    JpCond(Cond, u16),
    JpHl,
    Call(u16),
    CallCond(Cond, u16),
    /// Target vector (0x00, 0x08 .. 0x38)
    Rst(u8),
    Pop(R16Stk),
    Push(R16Stk),
    LdhCA,
    LdhAC,
    LdhImmA(u8),
    LdhAImm(u8),
    LdImm16A(u16),
    LdAImm16(u16),
    AddSp(i8),
    LdHlSp(i8),
    LdSpHl,
    Di,
    Ei,
    Shift(ShiftOp, R8),
    Bit(u8, R8),
    Res(u8, R8),
    Set(u8, R8),
    /// One of the eleven unused opcodes
    Invalid(u8),
}

fn imm16(next: &mut impl FnMut() -> u8) -> u16 {
    let lo = next() as u16;
    let hi = next() as u16;
    (hi << 8) | lo
}

/// Decode `opcode`, pulling immediate bytes (and the CB suffix) from `next`.
pub fn decode(opcode: u8, mut next: impl FnMut() -> u8) -> Instruction {
    match opcode >> 6 {
        0 => decode_block0(opcode, &mut next),
        1 if opcode == 0x76 => Instruction::Halt,
        1 => Instruction::LdR8R8(R8::from_bits(opcode >> 3), R8::from_bits(opcode)),
        2 => Instruction::Alu(AluOp::from_bits(opcode >> 3), R8::from_bits(opcode)),
        _ => decode_block3(opcode, &mut next),
    }
}

fn decode_block0(opcode: u8, next: &mut impl FnMut() -> u8) -> Instruction {
    let y = (opcode >> 3) & 0x07;
    let p = (opcode >> 4) & 0x03;
    let q = opcode & 0x08 != 0;

    match opcode & 0x07 {
        0 => match opcode {
            0x00 => Instruction::Nop,
            0x08 => Instruction::LdImm16Sp(imm16(next)),
            0x10 => Instruction::Stop,
            0x18 => Instruction::Jr(next() as i8),
            _ => Instruction::JrCond(Cond::from_bits(y), next() as i8),
        },
        1 if q => Instruction::AddHl(R16::from_bits(p)),
        1 => Instruction::LdR16Imm(R16::from_bits(p), imm16(next)),
        2 if q => Instruction::LdAMem(R16Mem::from_bits(p)),
        2 => Instruction::LdMemA(R16Mem::from_bits(p)),
        3 if q => Instruction::DecR16(R16::from_bits(p)),
        3 => Instruction::IncR16(R16::from_bits(p)),
        4 => Instruction::IncR8(R8::from_bits(y)),
        5 => Instruction::DecR8(R8::from_bits(y)),
        6 => Instruction::LdR8Imm(R8::from_bits(y), next()),
        _ => match y {
            0 => Instruction::Rlca,
            1 => Instruction::Rrca,
            2 => Instruction::Rla,
            3 => Instruction::Rra,
            4 => Instruction::Daa,
            5 => Instruction::Cpl,
            6 => Instruction::Scf,
            _ => Instruction::Ccf,
        },
    }
}

fn decode_block3(opcode: u8, next: &mut impl FnMut() -> u8) -> Instruction {
    let y = (opcode >> 3) & 0x07;
    let p = (opcode >> 4) & 0x03;

    match opcode {
        0xC0 | 0xC8 | 0xD0 | 0xD8 => Instruction::RetCond(Cond::from_bits(y)),
        0xC9 => Instruction::Ret,
        0xD9 => Instruction::Reti,
        0xC2 | 0xCA | 0xD2 | 0xDA => Instruction::JpCond(Cond::from_bits(y), imm16(next)),
        0xC3 => Instruction::Jp(imm16(next)),
        0xE9 => Instruction::JpHl,
        0xC4 | 0xCC | 0xD4 | 0xDC => Instruction::CallCond(Cond::from_bits(y), imm16(next)),
        0xCD => Instruction::Call(imm16(next)),
        0xCB => decode_cb(next()),
        0xE0 => Instruction::LdhImmA(next()),
        0xF0 => Instruction::LdhAImm(next()),
        0xE2 => Instruction::LdhCA,
        0xF2 => Instruction::LdhAC,
        0xEA => Instruction::LdImm16A(imm16(next)),
        0xFA => Instruction::LdAImm16(imm16(next)),
        0xE8 => Instruction::AddSp(next() as i8),
        0xF8 => Instruction::LdHlSp(next() as i8),
        0xF9 => Instruction::LdSpHl,
        0xF3 => Instruction::Di,
        0xFB => Instruction::Ei,
        _ => match opcode & 0x0F {
            0x01 => Instruction::Pop(R16Stk::from_bits(p)),
            0x05 => Instruction::Push(R16Stk::from_bits(p)),
            0x06 | 0x0E => Instruction::AluImm(AluOp::from_bits(y), next()),
            0x07 | 0x0F => Instruction::Rst(y * 8),
            _ => Instruction::Invalid(opcode),
        },
    }
}

fn decode_cb(op: u8) -> Instruction {
    let y = (op >> 3) & 0x07;
    let r = R8::from_bits(op);
    match op >> 6 {
        0 => Instruction::Shift(ShiftOp::from_bits(y), r),
        1 => Instruction::Bit(y, r),
        2 => Instruction::Res(y, r),
        _ => Instruction::Set(y, r),
    }
}

impl fmt::Display for R8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            R8::B => "b",
            R8::C => "c",
            R8::D => "d",
            R8::E => "e",
            R8::H => "h",
            R8::L => "l",
            R8::HlInd => "[hl]",
            R8::A => "a",
        };
        f.write_str(s)
    }
}

impl fmt::Display for R16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            R16::BC => "bc",
            R16::DE => "de",
            R16::HL => "hl",
            R16::SP => "sp",
        })
    }
}

impl fmt::Display for R16Stk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            R16Stk::BC => "bc",
            R16Stk::DE => "de",
            R16Stk::HL => "hl",
            R16Stk::AF => "af",
        })
    }
}

impl fmt::Display for R16Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            R16Mem::BC => "[bc]",
            R16Mem::DE => "[de]",
            R16Mem::HLInc => "[hl+]",
            R16Mem::HLDec => "[hl-]",
        })
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cond::NZ => "nz",
            Cond::Z => "z",
            Cond::NC => "nc",
            Cond::C => "c",
        })
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AluOp::Add => "add",
            AluOp::Adc => "adc",
            AluOp::Sub => "sub",
            AluOp::Sbc => "sbc",
            AluOp::And => "and",
            AluOp::Xor => "xor",
            AluOp::Or => "or",
            AluOp::Cp => "cp",
        })
    }
}

impl fmt::Display for ShiftOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftOp::Rlc => "rlc",
            ShiftOp::Rrc => "rrc",
            ShiftOp::Rl => "rl",
            ShiftOp::Rr => "rr",
            ShiftOp::Sla => "sla",
            ShiftOp::Sra => "sra",
            ShiftOp::Swap => "swap",
            ShiftOp::Srl => "srl",
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match *self {
            Nop => write!(f, "nop"),
            Stop => write!(f, "stop"),
            Halt => write!(f, "halt"),
            LdR16Imm(r, v) => write!(f, "ld {}, ${:04X}", r, v),
            LdMemA(m) => write!(f, "ld {}, a", m),
            LdAMem(m) => write!(f, "ld a, {}", m),
            LdImm16Sp(v) => write!(f, "ld [${:04X}], sp", v),
            IncR16(r) => write!(f, "inc {}", r),
            DecR16(r) => write!(f, "dec {}", r),
            AddHl(r) => write!(f, "add hl, {}", r),
            IncR8(r) => write!(f, "inc {}", r),
            DecR8(r) => write!(f, "dec {}", r),
            LdR8Imm(r, v) => write!(f, "ld {}, ${:02X}", r, v),
            Rlca => write!(f, "rlca"),
            Rrca => write!(f, "rrca"),
            Rla => write!(f, "rla"),
            Rra => write!(f, "rra"),
            Daa => write!(f, "daa"),
            Cpl => write!(f, "cpl"),
            Scf => write!(f, "scf"),
            Ccf => write!(f, "ccf"),
            Jr(e) => write!(f, "jr {:+}", e),
            JrCond(c, e) => write!(f, "jr {}, {:+}", c, e),
            LdR8R8(d, s) => write!(f, "ld {}, {}", d, s),
            Alu(op, r) => write!(f, "{} a, {}", op, r),
            AluImm(op, v) => write!(f, "{} a, ${:02X}", op, v),
            Ret => write!(f, "ret"),
            RetCond(c) => write!(f, "ret {}", c),
            Reti => write!(f, "reti"),
            Jp(a) => write!(f, "jp ${:04X}", a),
            JpCond(c, a) => write!(f, "jp {}, ${:04X}", c, a),
            JpHl => write!(f, "jp hl"),
            Call(a) => write!(f, "call ${:04X}", a),
            CallCond(c, a) => write!(f, "call {}, ${:04X}", c, a),
            Rst(v) => write!(f, "rst ${:02X}", v),
            Pop(r) => write!(f, "pop {}", r),
            Push(r) => write!(f, "push {}", r),
            LdhCA => write!(f, "ldh [c], a"),
            LdhAC => write!(f, "ldh a, [c]"),
            LdhImmA(v) => write!(f, "ldh [$FF{:02X}], a", v),
            LdhAImm(v) => write!(f, "ldh a, [$FF{:02X}]", v),
            LdImm16A(a) => write!(f, "ld [${:04X}], a", a),
            LdAImm16(a) => write!(f, "ld a, [${:04X}]", a),
            AddSp(e) => write!(f, "add sp, {:+}", e),
            LdHlSp(e) => write!(f, "ld hl, sp{:+}", e),
            LdSpHl => write!(f, "ld sp, hl"),
            Di => write!(f, "di"),
            Ei => write!(f, "ei"),
            Shift(op, r) => write!(f, "{} {}", op, r),
            Bit(b, r) => write!(f, "bit {}, {}", b, r),
            Res(b, r) => write!(f, "res {}, {}", b, r),
            Set(b, r) => write!(f, "set {}, {}", b, r),
            Invalid(op) => write!(f, "db ${:02X}", op),
        }
    }
}
