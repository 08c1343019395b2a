use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    error::Fault,
    instructions::{CbInstruction, CbOp, Indirect, Instruction, decode, decode_cb},
    interrupts::InterruptKind,
    memory::Memory,
    registers::{Condition, Operand, Registers},
};

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

const DMG_BOOT_AF: u16 = 0x01B0;
const DMG_BOOT_BC: u16 = 0x0013;
const DMG_BOOT_DE: u16 = 0x00D8;
const DMG_BOOT_HL: u16 = 0x014D;

const CGB_BOOT_AF: u16 = 0x1180;
const CGB_BOOT_BC: u16 = 0x0000;
const CGB_BOOT_DE: u16 = 0x0008;
const CGB_BOOT_HL: u16 = 0x007C;

/// 12 cycles of dispatch plus the 8-cycle push of PC.
const INTERRUPT_DISPATCH_CYCLES: u32 = 20;

/// Cycles charged for each step spent halted or stopped.
const IDLE_CYCLES: u32 = 4;

/// Instructions until EI or DI takes effect: the instruction itself, then
/// the next one.
const IME_DELAY: i8 = 2;

/// Extra cycles an (HL) operand adds per access.
const fn mem_cost(operand: Operand) -> u32 {
    if operand.is_memory() { 4 } else { 0 }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    #[default]
    Running,
    Halted,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    /// Pending IME change: positive enables, counted down once per
    /// instruction.
    ime_delta: i8,
    pub state: CpuState,
    /// Set by the HALT bug: the next opcode fetch does not advance PC.
    halt_bug: u8,
    cycles: u64,
    last_opcode: u8,
    last_pc: u16,
    last_cycles: u32,
    #[serde(skip)]
    trace: bool,
}

impl Cpu {
    /// CPU as left by the boot ROM, or all-zero at PC 0 when a boot ROM
    /// image is going to run.
    pub fn new(cgb: bool, boot_rom: bool) -> Self {
        let mut regs = Registers::default();
        if !boot_rom {
            let (af, bc, de, hl) = if cgb {
                (CGB_BOOT_AF, CGB_BOOT_BC, CGB_BOOT_DE, CGB_BOOT_HL)
            } else {
                (DMG_BOOT_AF, DMG_BOOT_BC, DMG_BOOT_DE, DMG_BOOT_HL)
            };
            regs.set_af(af);
            regs.set_bc(bc);
            regs.set_de(de);
            regs.set_hl(hl);
            regs.sp = BOOT_SP;
            regs.pc = BOOT_PC;
        }
        Self {
            regs,
            ime: false,
            ime_delta: 0,
            state: CpuState::Running,
            halt_bug: 0,
            cycles: 0,
            last_opcode: 0,
            last_pc: 0,
            last_cycles: 0,
            trace: false,
        }
    }

    /// Total cycles executed.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn last_opcode(&self) -> u8 {
        self.last_opcode
    }

    pub fn last_pc(&self) -> u16 {
        self.last_pc
    }

    pub fn last_cycles(&self) -> u32 {
        self.last_cycles
    }

    /// Account for cycles the CPU spent frozen by a blocking DMA.
    pub(crate) fn add_stall(&mut self, cycles: u32) {
        self.cycles += cycles as u64;
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    /// Run one instruction (or one idle step while halted) and any interrupt
    /// dispatch that follows it. Returns the T-states used.
    pub fn simulate(&mut self, mem: &mut Memory) -> Result<u32, Fault> {
        let mut cycles = match self.state {
            CpuState::Halted => {
                if mem.io.pending() != 0 {
                    self.state = CpuState::Running;
                }
                IDLE_CYCLES
            }
            CpuState::Stopped => {
                if mem.io.if_reg() & InterruptKind::Joypad.mask() != 0 {
                    self.state = CpuState::Running;
                }
                IDLE_CYCLES
            }
            CpuState::Running => self.step_instruction(mem)?,
        };
        self.step_ime_delta();
        cycles += self.service_interrupts(mem, cycles);
        self.cycles += cycles as u64;
        self.last_cycles = cycles;
        Ok(cycles)
    }

    /// Move the pending EI/DI one step toward zero; the change to IME lands
    /// when it gets there.
    fn step_ime_delta(&mut self) {
        if self.ime_delta == 0 {
            return;
        }
        let enable = self.ime_delta > 0;
        self.ime_delta -= self.ime_delta.signum();
        if self.ime_delta == 0 {
            self.ime = enable;
        }
    }

    /// Dispatch the highest-priority pending interrupt when IME is set.
    /// `elapsed` is the part of the current step already spent, used to
    /// timestamp the acknowledgement. Returns the dispatch cost.
    pub fn service_interrupts(&mut self, mem: &mut Memory, elapsed: u32) -> u32 {
        let pending = mem.io.pending();
        if pending == 0 {
            return 0;
        }
        if self.state == CpuState::Halted {
            self.state = CpuState::Running;
        }
        if !self.ime {
            return 0;
        }
        let Some(kind) = InterruptKind::highest(pending) else {
            return 0;
        };
        self.ime = false;
        self.ime_delta = 0;
        mem.io.acknowledge(kind, self.cycles + elapsed as u64);
        let pc = self.regs.pc;
        self.push(mem, pc);
        self.regs.pc = kind.vector();
        INTERRUPT_DISPATCH_CYCLES
    }

    fn step_instruction(&mut self, mem: &mut Memory) -> Result<u32, Fault> {
        let pc = self.regs.pc;
        let opcode = mem.read8(pc);
        if self.halt_bug > 0 {
            self.halt_bug -= 1;
        } else {
            self.regs.pc = pc.wrapping_add(1);
        }
        self.last_opcode = opcode;
        self.last_pc = pc;

        let instruction = decode(opcode);
        if self.trace {
            let mnemonic = instruction.to_string();
            trace!(
                "{pc:04X}: {opcode:02X} {mnemonic:<14} AF={:04X} BC={:04X} DE={:04X} HL={:04X} SP={:04X}",
                self.regs.af(),
                self.regs.bc(),
                self.regs.de(),
                self.regs.hl(),
                self.regs.sp
            );
        }
        #[cfg(feature = "cpu-trace")]
        log::trace!(
            "cpu pc={pc:04X} op={opcode:02X} ime={} state={:?} cycles={}",
            self.ime,
            self.state,
            self.cycles
        );

        let result = self.execute(instruction, mem);
        if result.is_err() {
            self.regs.pc = pc;
        }
        result
    }

    fn fetch8(&mut self, mem: &mut Memory) -> u8 {
        let val = mem.read8(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self, mem: &mut Memory) -> u16 {
        let lo = self.fetch8(mem);
        let hi = self.fetch8(mem);
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, mem: &mut Memory, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.write8(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mem.write8(self.regs.sp, lo);
    }

    fn pop(&mut self, mem: &mut Memory) -> u16 {
        let lo = mem.read8(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = mem.read8(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Registers resolve directly; (HL) goes through the bus.
    fn read_operand(&mut self, mem: &mut Memory, operand: Operand) -> u8 {
        match operand {
            Operand::Reg(r) => self.regs.get(r),
            Operand::HlIndirect => mem.read8(self.regs.hl()),
        }
    }

    fn write_operand(&mut self, mem: &mut Memory, operand: Operand, val: u8) {
        match operand {
            Operand::Reg(r) => self.regs.set(r, val),
            Operand::HlIndirect => mem.write8(self.regs.hl(), val),
        }
    }

    fn indirect_addr(&mut self, ind: Indirect) -> u16 {
        match ind {
            Indirect::Bc => self.regs.bc(),
            Indirect::De => self.regs.de(),
            Indirect::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            Indirect::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn taken(&self, cond: Option<Condition>) -> bool {
        cond.is_none_or(|c| self.regs.condition(c))
    }

    fn execute(&mut self, instruction: Instruction, mem: &mut Memory) -> Result<u32, Fault> {
        let cycles = match instruction {
            Instruction::Nop => 4,
            Instruction::Stop => {
                // STOP is followed by a padding byte.
                self.fetch8(mem);
                if mem.io.is_cgb() && mem.io.speed_switch_armed() {
                    mem.io.switch_speed();
                } else {
                    self.state = CpuState::Stopped;
                }
                4
            }
            Instruction::Halt => {
                if !self.ime && mem.io.pending() != 0 {
                    self.halt_bug = 1;
                } else {
                    self.state = CpuState::Halted;
                }
                4
            }
            Instruction::Di => {
                self.ime_delta = -IME_DELAY;
                4
            }
            Instruction::Ei => {
                self.ime_delta = IME_DELAY;
                4
            }
            Instruction::Ld(dst, src) => {
                let val = self.read_operand(mem, src);
                self.write_operand(mem, dst, val);
                4 + mem_cost(dst) + mem_cost(src)
            }
            Instruction::LdImm8(dst) => {
                let val = self.fetch8(mem);
                self.write_operand(mem, dst, val);
                8 + mem_cost(dst)
            }
            Instruction::LdImm16(rr) => {
                let val = self.fetch16(mem);
                self.regs.set16(rr, val);
                12
            }
            Instruction::StoreA(ind) => {
                let addr = self.indirect_addr(ind);
                mem.write8(addr, self.regs.a);
                8
            }
            Instruction::LoadA(ind) => {
                let addr = self.indirect_addr(ind);
                self.regs.a = mem.read8(addr);
                8
            }
            Instruction::LdAddrSp => {
                let addr = self.fetch16(mem);
                mem.write16(addr, self.regs.sp);
                20
            }
            Instruction::LdHighA => {
                let offset = self.fetch8(mem);
                mem.write8(0xFF00 | offset as u16, self.regs.a);
                12
            }
            Instruction::LdAHigh => {
                let offset = self.fetch8(mem);
                self.regs.a = mem.read8(0xFF00 | offset as u16);
                12
            }
            Instruction::LdHighCA => {
                mem.write8(0xFF00 | self.regs.c as u16, self.regs.a);
                8
            }
            Instruction::LdAHighC => {
                self.regs.a = mem.read8(0xFF00 | self.regs.c as u16);
                8
            }
            Instruction::LdAbsA => {
                let addr = self.fetch16(mem);
                mem.write8(addr, self.regs.a);
                16
            }
            Instruction::LdAAbs => {
                let addr = self.fetch16(mem);
                self.regs.a = mem.read8(addr);
                16
            }
            Instruction::LdSpHl => {
                self.regs.sp = self.regs.hl();
                8
            }
            Instruction::LdHlSpOffset => {
                let offset = self.fetch8(mem) as i8;
                let val = self.regs.sp_offset(offset);
                self.regs.set_hl(val);
                12
            }
            Instruction::AddSpOffset => {
                let offset = self.fetch8(mem) as i8;
                self.regs.sp = self.regs.sp_offset(offset);
                16
            }
            Instruction::Inc16(rr) => {
                let val = self.regs.get16(rr).wrapping_add(1);
                self.regs.set16(rr, val);
                8
            }
            Instruction::Dec16(rr) => {
                let val = self.regs.get16(rr).wrapping_sub(1);
                self.regs.set16(rr, val);
                8
            }
            Instruction::AddHl(rr) => {
                let val = self.regs.get16(rr);
                self.regs.add_hl(val);
                8
            }
            Instruction::Inc8(operand) => {
                let val = self.read_operand(mem, operand);
                let res = self.regs.inc8(val);
                self.write_operand(mem, operand, res);
                4 + 2 * mem_cost(operand)
            }
            Instruction::Dec8(operand) => {
                let val = self.read_operand(mem, operand);
                let res = self.regs.dec8(val);
                self.write_operand(mem, operand, res);
                4 + 2 * mem_cost(operand)
            }
            Instruction::RotateA(op) => {
                self.regs.rotate_a(op);
                4
            }
            Instruction::Daa => {
                self.regs.daa();
                4
            }
            Instruction::Cpl => {
                self.regs.cpl();
                4
            }
            Instruction::Scf => {
                self.regs.scf();
                4
            }
            Instruction::Ccf => {
                self.regs.ccf();
                4
            }
            Instruction::Alu(op, src) => {
                let val = self.read_operand(mem, src);
                self.regs.alu(op, val);
                4 + mem_cost(src)
            }
            Instruction::AluImm(op) => {
                let val = self.fetch8(mem);
                self.regs.alu(op, val);
                8
            }
            Instruction::Jr(cond) => {
                let offset = self.fetch8(mem) as i8;
                if self.taken(cond) {
                    self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
                    12
                } else {
                    8
                }
            }
            Instruction::Jp(cond) => {
                let addr = self.fetch16(mem);
                if self.taken(cond) {
                    self.regs.pc = addr;
                    16
                } else {
                    12
                }
            }
            Instruction::JpHl => {
                self.regs.pc = self.regs.hl();
                4
            }
            Instruction::Call(cond) => {
                let addr = self.fetch16(mem);
                if self.taken(cond) {
                    let ret = self.regs.pc;
                    self.push(mem, ret);
                    self.regs.pc = addr;
                    24
                } else {
                    12
                }
            }
            Instruction::Ret(None) => {
                self.regs.pc = self.pop(mem);
                16
            }
            Instruction::Ret(cond) => {
                if self.taken(cond) {
                    self.regs.pc = self.pop(mem);
                    20
                } else {
                    8
                }
            }
            Instruction::Reti => {
                self.regs.pc = self.pop(mem);
                self.ime = true;
                self.ime_delta = 0;
                16
            }
            Instruction::Rst(vector) => {
                let ret = self.regs.pc;
                self.push(mem, ret);
                self.regs.pc = vector as u16;
                16
            }
            Instruction::Push(pair) => {
                let val = self.regs.get_stack_pair(pair);
                self.push(mem, val);
                16
            }
            Instruction::Pop(pair) => {
                let val = self.pop(mem);
                self.regs.set_stack_pair(pair, val);
                12
            }
            Instruction::Prefix => {
                let op = self.fetch8(mem);
                let cb = decode_cb(op);
                if self.trace {
                    trace!("        CB {op:02X} {cb}");
                }
                self.execute_cb(cb, mem)
            }
            Instruction::Illegal(opcode) => {
                return Err(Fault::UnknownOpcode {
                    opcode,
                    pc: self.last_pc,
                });
            }
        };
        Ok(cycles)
    }

    fn execute_cb(&mut self, cb: CbInstruction, mem: &mut Memory) -> u32 {
        let val = self.read_operand(mem, cb.operand);
        match cb.op {
            CbOp::Shift(op) => {
                let res = self.regs.shift(op, val);
                self.write_operand(mem, cb.operand, res);
            }
            CbOp::Bit(n) => self.regs.bit(n, val),
            CbOp::Res(n) => self.write_operand(mem, cb.operand, val & !(1 << n)),
            CbOp::Set(n) => self.write_operand(mem, cb.operand, val | (1 << n)),
        }
        cb.cycles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbc::Mbc;
    use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z};

    fn setup(program: &[u8]) -> (Cpu, Memory) {
        let mut rom = vec![0; 0x8000];
        rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
        let mbc = Mbc::from_rom(rom, false).unwrap();
        let mut mem = Memory::new(mbc, false, false, None);
        // Drop the post-boot V-blank request so it does not get in the way.
        mem.io.set_reg(crate::io::reg::IF, 0);
        (Cpu::new(false, false), mem)
    }

    #[test]
    fn post_boot_registers() {
        let dmg = Cpu::new(false, false);
        assert_eq!(dmg.regs.af(), 0x01B0);
        assert_eq!(dmg.regs.bc(), 0x0013);
        assert_eq!(dmg.regs.de(), 0x00D8);
        assert_eq!(dmg.regs.hl(), 0x014D);
        assert_eq!(dmg.regs.sp, 0xFFFE);
        assert_eq!(dmg.regs.pc, 0x0100);

        let cgb = Cpu::new(true, false);
        assert_eq!(cgb.regs.a, 0x11);
        assert_eq!(cgb.regs.f, 0x80);

        let boot = Cpu::new(true, true);
        assert_eq!(boot.regs.pc, 0);
        assert_eq!(boot.regs.af(), 0);
    }

    #[test]
    fn load_then_subtract_immediate() {
        let (mut cpu, mut mem) = setup(&[0x3E, 0xFF, 0xD6, 0x01]);
        assert_eq!(cpu.simulate(&mut mem), Ok(8));
        assert_eq!(cpu.simulate(&mut mem), Ok(8));
        assert_eq!(cpu.regs.a, 0xFE);
        assert_eq!(cpu.regs.f & (FLAG_Z | FLAG_H | FLAG_C), 0);
        assert_ne!(cpu.regs.f & FLAG_N, 0);
        assert_eq!(cpu.cycles(), 16);
    }

    #[test]
    fn conditional_costs_depend_on_outcome() {
        // XOR A sets Z; JR NZ falls through, JR Z is taken.
        let (mut cpu, mut mem) = setup(&[0xAF, 0x20, 0x10, 0x28, 0x00]);
        cpu.simulate(&mut mem).unwrap();
        assert_eq!(cpu.simulate(&mut mem), Ok(8));
        assert_eq!(cpu.simulate(&mut mem), Ok(12));
    }

    #[test]
    fn call_and_ret_round_trip() {
        let mut program = vec![0xCD, 0x00, 0x02];
        program.resize(0x100, 0x00);
        program.push(0xC9);
        let (mut cpu, mut mem) = setup(&program);
        assert_eq!(cpu.simulate(&mut mem), Ok(24));
        assert_eq!(cpu.regs.pc, 0x0200);
        assert_eq!(cpu.regs.sp, 0xFFFC);
        assert_eq!(cpu.simulate(&mut mem), Ok(16));
        assert_eq!(cpu.regs.pc, 0x0103);
    }

    #[test]
    fn illegal_opcode_faults_and_rewinds() {
        let (mut cpu, mut mem) = setup(&[0x00, 0xD3]);
        cpu.simulate(&mut mem).unwrap();
        assert_eq!(
            cpu.simulate(&mut mem),
            Err(Fault::UnknownOpcode {
                opcode: 0xD3,
                pc: 0x0101
            })
        );
        assert_eq!(cpu.regs.pc, 0x0101);
    }

    #[test]
    fn cb_bit_on_hl_costs_twelve() {
        // LD HL,C000 ; BIT 7,(HL) ; SET 7,(HL)
        let (mut cpu, mut mem) = setup(&[0x21, 0x00, 0xC0, 0xCB, 0x7E, 0xCB, 0xFE]);
        cpu.simulate(&mut mem).unwrap();
        assert_eq!(cpu.simulate(&mut mem), Ok(12));
        assert_ne!(cpu.regs.f & FLAG_Z, 0);
        assert_eq!(cpu.simulate(&mut mem), Ok(16));
        assert_eq!(mem.peek(0xC000), 0x80);
    }

    #[test]
    fn stop_without_armed_switch_stops() {
        let (mut cpu, mut mem) = setup(&[0x10, 0x00]);
        cpu.simulate(&mut mem).unwrap();
        assert_eq!(cpu.state, CpuState::Stopped);
        assert_eq!(cpu.regs.pc, 0x0102);
    }
}
