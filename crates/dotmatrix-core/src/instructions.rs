//! Opcode classification.
//!
//! Opcodes are split into the fields `xx yyy zzz` with `yyy = ppq`
//! (gbdev.io/gb-opcodes/optables/) and mapped to an [`Instruction`] family.
//! Decoding never touches machine state.

use std::fmt;

use crate::registers::{AluOp, Condition, Operand, Reg8, Reg16, Shift, StackPair};

/// Memory operand of the `LD (rr),A` / `LD A,(rr)` group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    Bc,
    De,
    HlInc,
    HlDec,
}

impl Indirect {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Indirect::Bc,
            1 => Indirect::De,
            2 => Indirect::HlInc,
            _ => Indirect::HlDec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    /// `LD dst,src` between registers and (HL).
    Ld(Operand, Operand),
    LdImm8(Operand),
    LdImm16(Reg16),
    StoreA(Indirect),
    LoadA(Indirect),
    /// `LD (a16),SP`
    LdAddrSp,
    /// `LDH (a8),A`
    LdHighA,
    /// `LDH A,(a8)`
    LdAHigh,
    /// `LD (C),A`
    LdHighCA,
    /// `LD A,(C)`
    LdAHighC,
    /// `LD (a16),A`
    LdAbsA,
    /// `LD A,(a16)`
    LdAAbs,
    LdSpHl,
    /// `LD HL,SP+e8`
    LdHlSpOffset,
    /// `ADD SP,e8`
    AddSpOffset,
    Inc16(Reg16),
    Dec16(Reg16),
    AddHl(Reg16),
    Inc8(Operand),
    Dec8(Operand),
    /// RLCA, RRCA, RLA, RRA
    RotateA(Shift),
    Daa,
    Cpl,
    Scf,
    Ccf,
    Alu(AluOp, Operand),
    AluImm(AluOp),
    Jr(Option<Condition>),
    Jp(Option<Condition>),
    JpHl,
    Call(Option<Condition>),
    Ret(Option<Condition>),
    Reti,
    Rst(u8),
    Push(StackPair),
    Pop(StackPair),
    /// 0xCB: the next byte selects a [`CbInstruction`].
    Prefix,
    Illegal(u8),
}

impl Instruction {
    /// Bytes following the opcode.
    pub const fn immediate_len(self) -> u8 {
        match self {
            Instruction::LdImm8(_)
            | Instruction::LdHighA
            | Instruction::LdAHigh
            | Instruction::LdHlSpOffset
            | Instruction::AddSpOffset
            | Instruction::AluImm(_)
            | Instruction::Jr(_)
            | Instruction::Prefix
            | Instruction::Stop => 1,
            Instruction::LdImm16(_)
            | Instruction::LdAddrSp
            | Instruction::LdAbsA
            | Instruction::LdAAbs
            | Instruction::Jp(_)
            | Instruction::Call(_) => 2,
            _ => 0,
        }
    }
}

/// Decode one base-table opcode.
pub const fn decode(op: u8) -> Instruction {
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    match x {
        0 => match z {
            0 => match y {
                0 => Instruction::Nop,
                1 => Instruction::LdAddrSp,
                2 => Instruction::Stop,
                3 => Instruction::Jr(None),
                _ => Instruction::Jr(Some(Condition::from_bits(y - 4))),
            },
            1 => {
                if q == 0 {
                    Instruction::LdImm16(Reg16::from_bits(p))
                } else {
                    Instruction::AddHl(Reg16::from_bits(p))
                }
            }
            2 => {
                if q == 0 {
                    Instruction::StoreA(Indirect::from_bits(p))
                } else {
                    Instruction::LoadA(Indirect::from_bits(p))
                }
            }
            3 => {
                if q == 0 {
                    Instruction::Inc16(Reg16::from_bits(p))
                } else {
                    Instruction::Dec16(Reg16::from_bits(p))
                }
            }
            4 => Instruction::Inc8(Operand::from_bits(y)),
            5 => Instruction::Dec8(Operand::from_bits(y)),
            6 => Instruction::LdImm8(Operand::from_bits(y)),
            _ => match y {
                0..=3 => Instruction::RotateA(Shift::from_bits(y)),
                4 => Instruction::Daa,
                5 => Instruction::Cpl,
                6 => Instruction::Scf,
                _ => Instruction::Ccf,
            },
        },
        1 => {
            if y == 6 && z == 6 {
                Instruction::Halt
            } else {
                Instruction::Ld(Operand::from_bits(y), Operand::from_bits(z))
            }
        }
        2 => Instruction::Alu(AluOp::from_bits(y), Operand::from_bits(z)),
        _ => match z {
            0 => match y {
                0..=3 => Instruction::Ret(Some(Condition::from_bits(y))),
                4 => Instruction::LdHighA,
                5 => Instruction::AddSpOffset,
                6 => Instruction::LdAHigh,
                _ => Instruction::LdHlSpOffset,
            },
            1 => {
                if q == 0 {
                    Instruction::Pop(StackPair::from_bits(p))
                } else {
                    match p {
                        0 => Instruction::Ret(None),
                        1 => Instruction::Reti,
                        2 => Instruction::JpHl,
                        _ => Instruction::LdSpHl,
                    }
                }
            }
            2 => match y {
                0..=3 => Instruction::Jp(Some(Condition::from_bits(y))),
                4 => Instruction::LdHighCA,
                5 => Instruction::LdAbsA,
                6 => Instruction::LdAHighC,
                _ => Instruction::LdAAbs,
            },
            3 => match y {
                0 => Instruction::Jp(None),
                1 => Instruction::Prefix,
                6 => Instruction::Di,
                7 => Instruction::Ei,
                _ => Instruction::Illegal(op),
            },
            4 => {
                if y <= 3 {
                    Instruction::Call(Some(Condition::from_bits(y)))
                } else {
                    Instruction::Illegal(op)
                }
            }
            5 => {
                if q == 0 {
                    Instruction::Push(StackPair::from_bits(p))
                } else if p == 0 {
                    Instruction::Call(None)
                } else {
                    Instruction::Illegal(op)
                }
            }
            6 => Instruction::AluImm(AluOp::from_bits(y)),
            _ => Instruction::Rst(y * 8),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbOp {
    Shift(Shift),
    Bit(u8),
    Res(u8),
    Set(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CbInstruction {
    pub op: CbOp,
    pub operand: Operand,
}

impl CbInstruction {
    /// T-states including the prefix fetch.
    pub const fn cycles(self) -> u32 {
        match (self.op, self.operand) {
            (CbOp::Bit(_), Operand::HlIndirect) => 12,
            (_, Operand::HlIndirect) => 16,
            _ => 8,
        }
    }
}

/// Decode the byte following a 0xCB prefix.
pub const fn decode_cb(op: u8) -> CbInstruction {
    let y = (op >> 3) & 0x07;
    let operand = Operand::from_bits(op);
    let op = match op >> 6 {
        0 => CbOp::Shift(Shift::from_bits(y)),
        1 => CbOp::Bit(y),
        2 => CbOp::Res(y),
        _ => CbOp::Set(y),
    };
    CbInstruction { op, operand }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
            Reg8::A => "A",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => r.fmt(f),
            Operand::HlIndirect => f.write_str("(HL)"),
        }
    }
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
        };
        f.write_str(name)
    }
}

impl fmt::Display for StackPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackPair::BC => "BC",
            StackPair::DE => "DE",
            StackPair::HL => "HL",
            StackPair::AF => "AF",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Condition::NotZero => "NZ",
            Condition::Zero => "Z",
            Condition::NotCarry => "NC",
            Condition::Carry => "C",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Indirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Indirect::Bc => "(BC)",
            Indirect::De => "(DE)",
            Indirect::HlInc => "(HL+)",
            Indirect::HlDec => "(HL-)",
        };
        f.write_str(name)
    }
}

fn alu_name(op: AluOp) -> &'static str {
    match op {
        AluOp::Add => "ADD A,",
        AluOp::Adc => "ADC A,",
        AluOp::Sub => "SUB ",
        AluOp::Sbc => "SBC A,",
        AluOp::And => "AND ",
        AluOp::Xor => "XOR ",
        AluOp::Or => "OR ",
        AluOp::Cp => "CP ",
    }
}

fn shift_name(op: Shift) -> &'static str {
    match op {
        Shift::Rlc => "RLC",
        Shift::Rrc => "RRC",
        Shift::Rl => "RL",
        Shift::Rr => "RR",
        Shift::Sla => "SLA",
        Shift::Sra => "SRA",
        Shift::Swap => "SWAP",
        Shift::Srl => "SRL",
    }
}

fn with_condition(f: &mut fmt::Formatter<'_>, name: &str, cond: Option<Condition>, arg: &str) -> fmt::Result {
    match (cond, arg.is_empty()) {
        (Some(c), true) => write!(f, "{name} {c}"),
        (Some(c), false) => write!(f, "{name} {c},{arg}"),
        (None, true) => f.write_str(name),
        (None, false) => write!(f, "{name} {arg}"),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Nop => f.write_str("NOP"),
            Instruction::Stop => f.write_str("STOP"),
            Instruction::Halt => f.write_str("HALT"),
            Instruction::Di => f.write_str("DI"),
            Instruction::Ei => f.write_str("EI"),
            Instruction::Ld(dst, src) => write!(f, "LD {dst},{src}"),
            Instruction::LdImm8(dst) => write!(f, "LD {dst},d8"),
            Instruction::LdImm16(rr) => write!(f, "LD {rr},d16"),
            Instruction::StoreA(ind) => write!(f, "LD {ind},A"),
            Instruction::LoadA(ind) => write!(f, "LD A,{ind}"),
            Instruction::LdAddrSp => f.write_str("LD (a16),SP"),
            Instruction::LdHighA => f.write_str("LDH (a8),A"),
            Instruction::LdAHigh => f.write_str("LDH A,(a8)"),
            Instruction::LdHighCA => f.write_str("LD (C),A"),
            Instruction::LdAHighC => f.write_str("LD A,(C)"),
            Instruction::LdAbsA => f.write_str("LD (a16),A"),
            Instruction::LdAAbs => f.write_str("LD A,(a16)"),
            Instruction::LdSpHl => f.write_str("LD SP,HL"),
            Instruction::LdHlSpOffset => f.write_str("LD HL,SP+r8"),
            Instruction::AddSpOffset => f.write_str("ADD SP,r8"),
            Instruction::Inc16(rr) => write!(f, "INC {rr}"),
            Instruction::Dec16(rr) => write!(f, "DEC {rr}"),
            Instruction::AddHl(rr) => write!(f, "ADD HL,{rr}"),
            Instruction::Inc8(r) => write!(f, "INC {r}"),
            Instruction::Dec8(r) => write!(f, "DEC {r}"),
            Instruction::RotateA(op) => write!(f, "{}A", shift_name(op)),
            Instruction::Daa => f.write_str("DAA"),
            Instruction::Cpl => f.write_str("CPL"),
            Instruction::Scf => f.write_str("SCF"),
            Instruction::Ccf => f.write_str("CCF"),
            Instruction::Alu(op, r) => write!(f, "{}{r}", alu_name(op)),
            Instruction::AluImm(op) => write!(f, "{}d8", alu_name(op)),
            Instruction::Jr(cond) => with_condition(f, "JR", cond, "r8"),
            Instruction::Jp(cond) => with_condition(f, "JP", cond, "a16"),
            Instruction::JpHl => f.write_str("JP HL"),
            Instruction::Call(cond) => with_condition(f, "CALL", cond, "a16"),
            Instruction::Ret(cond) => with_condition(f, "RET", cond, ""),
            Instruction::Reti => f.write_str("RETI"),
            Instruction::Rst(vec) => write!(f, "RST {vec:02X}H"),
            Instruction::Push(rr) => write!(f, "PUSH {rr}"),
            Instruction::Pop(rr) => write!(f, "POP {rr}"),
            Instruction::Prefix => f.write_str("PREFIX CB"),
            Instruction::Illegal(op) => write!(f, "ILLEGAL {op:02X}"),
        }
    }
}

impl fmt::Display for CbInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            CbOp::Shift(op) => write!(f, "{} {}", shift_name(op), self.operand),
            CbOp::Bit(n) => write!(f, "BIT {n},{}", self.operand),
            CbOp::Res(n) => write!(f, "RES {n},{}", self.operand),
            CbOp::Set(n) => write!(f, "SET {n},{}", self.operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ILLEGAL: [u8; 11] = [
        0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
    ];

    #[test]
    fn exactly_eleven_illegal_opcodes() {
        let illegal: Vec<u8> = (0..=255u8)
            .filter(|&op| matches!(decode(op), Instruction::Illegal(_)))
            .collect();
        assert_eq!(illegal, ILLEGAL);
    }

    #[test]
    fn classifies_representative_opcodes() {
        assert_eq!(decode(0x00), Instruction::Nop);
        assert_eq!(decode(0x76), Instruction::Halt);
        assert_eq!(
            decode(0x3E),
            Instruction::LdImm8(Operand::Reg(Reg8::A))
        );
        assert_eq!(decode(0xD6), Instruction::AluImm(AluOp::Sub));
        assert_eq!(
            decode(0x7E),
            Instruction::Ld(Operand::Reg(Reg8::A), Operand::HlIndirect)
        );
        assert_eq!(decode(0x22), Instruction::StoreA(Indirect::HlInc));
        assert_eq!(decode(0x3A), Instruction::LoadA(Indirect::HlDec));
        assert_eq!(decode(0xF1), Instruction::Pop(StackPair::AF));
        assert_eq!(decode(0xC5), Instruction::Push(StackPair::BC));
        assert_eq!(decode(0x20), Instruction::Jr(Some(Condition::NotZero)));
        assert_eq!(decode(0xDA), Instruction::Jp(Some(Condition::Carry)));
        assert_eq!(decode(0xCD), Instruction::Call(None));
        assert_eq!(decode(0xD9), Instruction::Reti);
        assert_eq!(decode(0xFF), Instruction::Rst(0x38));
        assert_eq!(decode(0xE8), Instruction::AddSpOffset);
        assert_eq!(decode(0xF8), Instruction::LdHlSpOffset);
        assert_eq!(decode(0x17), Instruction::RotateA(Shift::Rl));
        assert_eq!(decode(0x10), Instruction::Stop);
        assert_eq!(decode(0xCB), Instruction::Prefix);
    }

    #[test]
    fn cb_table_fields() {
        let ins = decode_cb(0x7E);
        assert_eq!(ins.op, CbOp::Bit(7));
        assert_eq!(ins.operand, Operand::HlIndirect);
        assert_eq!(ins.cycles(), 12);
        assert_eq!(decode_cb(0x37).op, CbOp::Shift(Shift::Swap));
        assert_eq!(decode_cb(0x86).cycles(), 16);
        assert_eq!(decode_cb(0xC1).cycles(), 8);
    }

    #[test]
    fn mnemonics() {
        assert_eq!(decode(0xD6).to_string(), "SUB d8");
        assert_eq!(decode(0x3E).to_string(), "LD A,d8");
        assert_eq!(decode(0xC0).to_string(), "RET NZ");
        assert_eq!(decode(0xC2).to_string(), "JP NZ,a16");
        assert_eq!(decode(0x2A).to_string(), "LD A,(HL+)");
        assert_eq!(decode_cb(0x46).to_string(), "BIT 0,(HL)");
        assert_eq!(decode(0xE7).to_string(), "RST 20H");
    }
}
