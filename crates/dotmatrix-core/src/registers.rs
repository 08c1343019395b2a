use serde::{Deserialize, Serialize};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

/// An 8-bit register reachable from the 3-bit operand field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
}

/// Target of the 3-bit operand field. Index 6 names the byte at (HL), which
/// needs a bus access and therefore cannot be served by [`Registers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg8),
    HlIndirect,
}

impl Operand {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Operand::Reg(Reg8::B),
            1 => Operand::Reg(Reg8::C),
            2 => Operand::Reg(Reg8::D),
            3 => Operand::Reg(Reg8::E),
            4 => Operand::Reg(Reg8::H),
            5 => Operand::Reg(Reg8::L),
            6 => Operand::HlIndirect,
            _ => Operand::Reg(Reg8::A),
        }
    }

    pub const fn is_memory(self) -> bool {
        matches!(self, Operand::HlIndirect)
    }
}

/// Register pair selected by the 2-bit field of 16-bit loads and arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
}

impl Reg16 {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Reg16::BC,
            1 => Reg16::DE,
            2 => Reg16::HL,
            _ => Reg16::SP,
        }
    }
}

/// Register pair selected by PUSH/POP, where the fourth slot is AF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPair {
    BC,
    DE,
    HL,
    AF,
}

impl StackPair {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => StackPair::BC,
            1 => StackPair::DE,
            2 => StackPair::HL,
            _ => StackPair::AF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

impl Condition {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Condition::NotZero,
            1 => Condition::Zero,
            2 => Condition::NotCarry,
            _ => Condition::Carry,
        }
    }
}

/// Accumulator operations, in opcode order (`10ooo___` and `11ooo110`).
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
    pub const fn from_bits(bits: u8) -> Self {
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

/// Rotate/shift family of the CB table, also used for the four
/// accumulator rotates of the base table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl Shift {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Shift::Rlc,
            1 => Shift::Rrc,
            2 => Shift::Rl,
            3 => Shift::Rr,
            4 => Shift::Sla,
            5 => Shift::Sra,
            6 => Shift::Swap,
            _ => Shift::Srl,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
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
}

impl Registers {
    pub fn get(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::A => self.a,
        }
    }

    pub fn set(&mut self, reg: Reg8, val: u8) {
        match reg {
            Reg8::B => self.b = val,
            Reg8::C => self.c = val,
            Reg8::D => self.d = val,
            Reg8::E => self.e = val,
            Reg8::H => self.h = val,
            Reg8::L => self.l = val,
            Reg8::A => self.a = val,
        }
    }

    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }

    pub fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8 & 0xF0;
    }

    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    pub fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    pub fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    pub fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    pub fn get16(&self, pair: Reg16) -> u16 {
        match pair {
            Reg16::BC => self.bc(),
            Reg16::DE => self.de(),
            Reg16::HL => self.hl(),
            Reg16::SP => self.sp,
        }
    }

    pub fn set16(&mut self, pair: Reg16, val: u16) {
        match pair {
            Reg16::BC => self.set_bc(val),
            Reg16::DE => self.set_de(val),
            Reg16::HL => self.set_hl(val),
            Reg16::SP => self.sp = val,
        }
    }

    pub fn get_stack_pair(&self, pair: StackPair) -> u16 {
        match pair {
            StackPair::BC => self.bc(),
            StackPair::DE => self.de(),
            StackPair::HL => self.hl(),
            StackPair::AF => self.af(),
        }
    }

    pub fn set_stack_pair(&mut self, pair: StackPair, val: u16) {
        match pair {
            StackPair::BC => self.set_bc(val),
            StackPair::DE => self.set_de(val),
            StackPair::HL => self.set_hl(val),
            StackPair::AF => self.set_af(val),
        }
    }

    #[inline]
    pub fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    #[inline]
    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = if z { FLAG_Z } else { 0 }
            | if n { FLAG_N } else { 0 }
            | if h { FLAG_H } else { 0 }
            | if c { FLAG_C } else { 0 };
    }

    pub fn condition(&self, cond: Condition) -> bool {
        match cond {
            Condition::NotZero => !self.flag(FLAG_Z),
            Condition::Zero => self.flag(FLAG_Z),
            Condition::NotCarry => !self.flag(FLAG_C),
            Condition::Carry => self.flag(FLAG_C),
        }
    }

    /// Apply an accumulator operation with `val` as the right-hand side.
    pub fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.a;
        let carry_in = self.flag(FLAG_C) as u8;
        match op {
            AluOp::Add | AluOp::Adc => {
                let c = if op == AluOp::Adc { carry_in } else { 0 };
                let wide = a as u16 + val as u16 + c as u16;
                let half = (a & 0x0F) + (val & 0x0F) + c > 0x0F;
                self.a = wide as u8;
                self.set_flags(self.a == 0, false, half, wide > 0xFF);
            }
            AluOp::Sub | AluOp::Sbc | AluOp::Cp => {
                let c = if op == AluOp::Sbc { carry_in } else { 0 };
                let wide = a as i16 - val as i16 - c as i16;
                let half = (a & 0x0F) as i16 - (val & 0x0F) as i16 - (c as i16) < 0;
                let res = wide as u8;
                if op != AluOp::Cp {
                    self.a = res;
                }
                self.set_flags(res == 0, true, half, wide < 0);
            }
            AluOp::And => {
                self.a = a & val;
                self.set_flags(self.a == 0, false, true, false);
            }
            AluOp::Xor => {
                self.a = a ^ val;
                self.set_flags(self.a == 0, false, false, false);
            }
            AluOp::Or => {
                self.a = a | val;
                self.set_flags(self.a == 0, false, false, false);
            }
        }
    }

    pub fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        let c = self.flag(FLAG_C);
        self.set_flags(res == 0, false, val & 0x0F == 0x0F, c);
        res
    }

    pub fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        let c = self.flag(FLAG_C);
        self.set_flags(res == 0, true, val & 0x0F == 0, c);
        res
    }

    /// ADD HL,rr. Z is preserved.
    pub fn add_hl(&mut self, val: u16) {
        let hl = self.hl();
        let half = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
        let carry = hl as u32 + val as u32 > 0xFFFF;
        let z = self.flag(FLAG_Z);
        self.set_hl(hl.wrapping_add(val));
        self.set_flags(z, false, half, carry);
    }

    /// SP plus a signed offset, as used by `ADD SP,e` and `LD HL,SP+e`.
    /// Flags come from the unsigned low-byte addition.
    pub fn sp_offset(&mut self, offset: i8) -> u16 {
        let sp = self.sp;
        let unsigned = offset as u8 as u16;
        let half = (sp & 0x000F) + (unsigned & 0x000F) > 0x000F;
        let carry = (sp & 0x00FF) + unsigned > 0x00FF;
        self.set_flags(false, false, half, carry);
        sp.wrapping_add(offset as i16 as u16)
    }

    pub fn daa(&mut self) {
        let mut a = self.a;
        let mut carry = self.flag(FLAG_C);
        let n = self.flag(FLAG_N);
        if !n {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.flag(FLAG_H) || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.flag(FLAG_H) {
                a = a.wrapping_sub(0x06);
            }
        }
        self.a = a;
        self.set_flags(a == 0, n, false, carry);
    }

    pub fn cpl(&mut self) {
        self.a = !self.a;
        self.f |= FLAG_N | FLAG_H;
    }

    pub fn scf(&mut self) {
        self.f = (self.f & FLAG_Z) | FLAG_C;
    }

    pub fn ccf(&mut self) {
        self.f = (self.f & (FLAG_Z | FLAG_C)) ^ FLAG_C;
    }

    /// CB-table rotate/shift of `val`; Z reflects the result.
    pub fn shift(&mut self, op: Shift, val: u8) -> u8 {
        let carry_in = self.flag(FLAG_C) as u8;
        let (res, carry) = match op {
            Shift::Rlc => (val.rotate_left(1), val & 0x80 != 0),
            Shift::Rrc => (val.rotate_right(1), val & 0x01 != 0),
            Shift::Rl => ((val << 1) | carry_in, val & 0x80 != 0),
            Shift::Rr => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            Shift::Sla => (val << 1, val & 0x80 != 0),
            Shift::Sra => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            Shift::Swap => (val.rotate_left(4), false),
            Shift::Srl => (val >> 1, val & 0x01 != 0),
        };
        self.set_flags(res == 0, false, false, carry);
        res
    }

    /// RLCA/RRCA/RLA/RRA: like the CB rotates but Z is always cleared.
    pub fn rotate_a(&mut self, op: Shift) {
        self.a = self.shift(op, self.a);
        self.f &= !FLAG_Z;
    }

    pub fn bit(&mut self, bit: u8, val: u8) {
        let c = self.flag(FLAG_C);
        self.set_flags(val & (1 << bit) == 0, false, true, c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_af_masks_low_flag_bits() {
        let mut regs = Registers::default();
        regs.set_af(0x12FF);
        assert_eq!(regs.a, 0x12);
        assert_eq!(regs.f, 0xF0);
    }

    #[test]
    fn operand_six_is_memory() {
        assert_eq!(Operand::from_bits(6), Operand::HlIndirect);
        assert_eq!(Operand::from_bits(7), Operand::Reg(Reg8::A));
        assert!(Operand::from_bits(6).is_memory());
    }

    #[test]
    fn daa_adjusts_bcd_addition() {
        let mut regs = Registers {
            a: 0x45,
            ..Registers::default()
        };
        regs.alu(AluOp::Add, 0x38);
        regs.daa();
        assert_eq!(regs.a, 0x83);
        assert!(!regs.flag(FLAG_C));

        regs.a = 0x99;
        regs.alu(AluOp::Add, 0x01);
        regs.daa();
        assert_eq!(regs.a, 0x00);
        assert!(regs.flag(FLAG_Z));
        assert!(regs.flag(FLAG_C));
    }

    #[test]
    fn daa_adjusts_bcd_subtraction() {
        let mut regs = Registers {
            a: 0x42,
            ..Registers::default()
        };
        regs.alu(AluOp::Sub, 0x13);
        regs.daa();
        assert_eq!(regs.a, 0x29);
        assert!(regs.flag(FLAG_N));
    }

    #[test]
    fn sp_offset_flags_use_low_byte() {
        let mut regs = Registers {
            sp: 0x00FF,
            ..Registers::default()
        };
        let res = regs.sp_offset(1);
        assert_eq!(res, 0x0100);
        assert!(regs.flag(FLAG_H));
        assert!(regs.flag(FLAG_C));

        regs.sp = 0x1000;
        let res = regs.sp_offset(-1);
        assert_eq!(res, 0x0FFF);
        assert!(!regs.flag(FLAG_H));
        assert!(!regs.flag(FLAG_C));
    }

    #[test]
    fn rotate_a_clears_zero() {
        let mut regs = Registers::default();
        regs.a = 0x00;
        regs.rotate_a(Shift::Rlc);
        assert_eq!(regs.f, 0);

        regs.a = 0x80;
        regs.rotate_a(Shift::Rl);
        assert_eq!(regs.a, 0x00);
        assert_eq!(regs.f, FLAG_C);
    }

    #[test]
    fn conditions_follow_flags() {
        let mut regs = Registers::default();
        regs.f = FLAG_Z;
        assert!(regs.condition(Condition::Zero));
        assert!(!regs.condition(Condition::NotZero));
        assert!(regs.condition(Condition::NotCarry));
        regs.f = FLAG_C;
        assert!(regs.condition(Condition::Carry));
    }
}
