use log::debug;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    apu::Apu,
    dma::{Hdma, OamDma},
    gpu::{Gpu, Mode},
    interrupts::{Interrupt, InterruptKind},
    joypad::Joypad,
    mbc::Mbc,
    serial::Serial,
    timer::Timer,
};

/// Offsets of the I/O registers within 0xFF00-0xFF7F.
pub mod reg {
    pub const P1: u8 = 0x00;
    pub const SB: u8 = 0x01;
    pub const SC: u8 = 0x02;
    pub const DIV: u8 = 0x04;
    pub const TIMA: u8 = 0x05;
    pub const TMA: u8 = 0x06;
    pub const TAC: u8 = 0x07;
    pub const IF: u8 = 0x0F;
    pub const NR52: u8 = 0x26;
    pub const LCDC: u8 = 0x40;
    pub const STAT: u8 = 0x41;
    pub const SCY: u8 = 0x42;
    pub const SCX: u8 = 0x43;
    pub const LY: u8 = 0x44;
    pub const LYC: u8 = 0x45;
    pub const DMA: u8 = 0x46;
    pub const BGP: u8 = 0x47;
    pub const OBP0: u8 = 0x48;
    pub const OBP1: u8 = 0x49;
    pub const WY: u8 = 0x4A;
    pub const WX: u8 = 0x4B;
    pub const KEY1: u8 = 0x4D;
    pub const VBK: u8 = 0x4F;
    pub const BOOT: u8 = 0x50;
    pub const HDMA5: u8 = 0x55;
    pub const BCPS: u8 = 0x68;
    pub const BCPD: u8 = 0x69;
    pub const OCPS: u8 = 0x6A;
    pub const OCPD: u8 = 0x6B;
    pub const SVBK: u8 = 0x70;
}

/// Events raised while the I/O block advanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStep {
    pub timer_overflow: bool,
    pub serial_complete: bool,
}

/// The I/O register block at 0xFF00-0xFF7F plus IE. Plain registers are
/// stored in `regs`; the rest are forwarded to the unit that owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Io {
    #[serde(with = "BigArray")]
    regs: [u8; 0x80],
    ie: u8,
    interrupts: [Interrupt; 5],
    pub timer: Timer,
    pub joypad: Joypad,
    pub serial: Serial,
    pub apu: Apu,
    pub oam_dma: OamDma,
    pub hdma: Hdma,
    double_speed: bool,
    speed_switch_armed: bool,
    boot_rom_mapped: bool,
    cgb: bool,
    /// Overflow caused by a DIV/TAC write, reported with the next step.
    #[serde(skip)]
    timer_event: bool,
}

impl Io {
    pub fn new(cgb: bool, boot_rom_mapped: bool) -> Self {
        let mut io = Self {
            regs: [0; 0x80],
            ie: 0,
            interrupts: Interrupt::table(),
            timer: Timer::new(),
            joypad: Joypad::new(),
            serial: Serial::new(cgb),
            apu: Apu::new(),
            oam_dma: OamDma::default(),
            hdma: Hdma::default(),
            double_speed: false,
            speed_switch_armed: false,
            boot_rom_mapped,
            cgb,
            timer_event: false,
        };
        if !boot_rom_mapped {
            io.apply_boot_state();
        }
        io
    }

    /// Register values the boot ROM leaves behind.
    fn apply_boot_state(&mut self) {
        self.regs[reg::LCDC as usize] = 0x91;
        self.regs[reg::STAT as usize] = 0x85;
        self.regs[reg::BGP as usize] = 0xFC;
        self.regs[reg::DMA as usize] = 0xFF;
        self.regs[reg::IF as usize] = 0x01;
        self.apu.apply_boot_state();
        if !self.cgb {
            // DIV phase measured on DMG after the boot ROM hands over.
            self.timer.div = 0xABCC;
        }
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn reg(&self, offset: u8) -> u8 {
        self.regs[(offset & 0x7F) as usize]
    }

    pub(crate) fn set_reg(&mut self, offset: u8, val: u8) {
        self.regs[(offset & 0x7F) as usize] = val;
    }

    pub fn lcd_enabled(&self) -> bool {
        self.regs[reg::LCDC as usize] & 0x80 != 0
    }

    pub fn double_speed(&self) -> bool {
        self.double_speed
    }

    pub fn speed_switch_armed(&self) -> bool {
        self.speed_switch_armed
    }

    /// Carry out an armed speed switch. Called by STOP.
    pub fn switch_speed(&mut self) {
        self.double_speed = !self.double_speed;
        self.speed_switch_armed = false;
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_rom_mapped
    }

    pub fn ie(&self) -> u8 {
        self.ie
    }

    pub fn set_ie(&mut self, val: u8) {
        self.ie = val;
    }

    pub fn if_reg(&self) -> u8 {
        self.regs[reg::IF as usize] & 0x1F
    }

    pub fn request(&mut self, kind: InterruptKind) {
        self.regs[reg::IF as usize] |= kind.mask();
    }

    /// Enabled and requested interrupts.
    pub fn pending(&self) -> u8 {
        self.ie & self.regs[reg::IF as usize] & 0x1F
    }

    /// Clear a request at dispatch and note when it happened.
    pub fn acknowledge(&mut self, kind: InterruptKind, now: u64) {
        self.regs[reg::IF as usize] &= !kind.mask();
        let entry = &mut self.interrupts[kind as usize];
        entry.last_time = now;
        entry.count += 1;
    }

    pub fn interrupt(&self, kind: InterruptKind) -> &Interrupt {
        &self.interrupts[kind as usize]
    }

    pub fn set_inputs(&mut self, mask: u8) {
        if self.joypad.set_inputs(mask) {
            self.request(InterruptKind::Joypad);
        }
    }

    /// Advance timer, serial and sound by `cycles` CPU cycles.
    pub fn simulate(&mut self, cycles: u32) -> IoStep {
        let if_reg = &mut self.regs[reg::IF as usize];
        let timer_overflow = self.timer.step(cycles, if_reg) | std::mem::take(&mut self.timer_event);
        let serial_complete = self.serial.step(cycles, if_reg);
        self.apu.step(cycles);
        IoStep {
            timer_overflow,
            serial_complete,
        }
    }

    pub fn read(&self, addr: u16, gpu: &Gpu, mbc: &Mbc) -> u8 {
        let offset = (addr & 0x7F) as u8;
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.regs[reg::IF as usize] | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF41 => self.regs[reg::STAT as usize] | 0x80,
            0xFF40 | 0xFF42..=0xFF4B => self.regs[offset as usize],
            0xFF4D if self.cgb => {
                let speed = if self.double_speed { 0x80 } else { 0 };
                0x7E | speed | self.speed_switch_armed as u8
            }
            0xFF4F if self.cgb => 0xFE | gpu.vram_bank(),
            0xFF55 if self.cgb => self.hdma.read(addr),
            0xFF68 if self.cgb => gpu.bcps(),
            0xFF69 if self.cgb => gpu.read_bcpd(),
            0xFF6A if self.cgb => gpu.ocps(),
            0xFF6B if self.cgb => gpu.read_ocpd(),
            0xFF70 if self.cgb => 0xF8 | mbc.wram_bank(),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, gpu: &mut Gpu, mbc: &mut Mbc) {
        let offset = (addr & 0x7F) as u8;
        match addr {
            0xFF00 => self.joypad.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => {
                let if_reg = &mut self.regs[reg::IF as usize];
                self.timer_event |= self.timer.write(addr, val, if_reg);
            }
            0xFF0F => self.regs[reg::IF as usize] = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.regs[reg::LCDC as usize] = val;
                let on = val & 0x80 != 0;
                if was_on != on {
                    gpu.set_power(on, self);
                }
            }
            0xFF41 => {
                let stat = &mut self.regs[reg::STAT as usize];
                *stat = (*stat & 0x07) | (val & 0x78);
                gpu.update_stat(self);
            }
            0xFF44 => {}
            0xFF45 => {
                self.regs[reg::LYC as usize] = val;
                gpu.update_stat(self);
            }
            0xFF46 => {
                self.regs[reg::DMA as usize] = val;
                self.oam_dma.start(val);
            }
            0xFF42 | 0xFF43 | 0xFF47..=0xFF4B => self.regs[offset as usize] = val,
            0xFF4D if self.cgb => self.speed_switch_armed = val & 0x01 != 0,
            0xFF4F if self.cgb => gpu.set_vram_bank(val),
            0xFF50 => {
                if val != 0 && self.boot_rom_mapped {
                    debug!("boot ROM unmapped");
                    self.boot_rom_mapped = false;
                }
            }
            0xFF51..=0xFF55 if self.cgb => {
                let immediate = !self.lcd_enabled() || gpu.mode() == Mode::HBlank;
                self.hdma.write(addr, val, immediate);
            }
            0xFF68 if self.cgb => gpu.set_bcps(val),
            0xFF69 if self.cgb => gpu.write_bcpd(val),
            0xFF6A if self.cgb => gpu.set_ocps(val),
            0xFF6B if self.cgb => gpu.write_ocpd(val),
            0xFF70 if self.cgb => mbc.set_wram_bank(val),
            _ => debug!("write to unmapped I/O register {addr:#06X} = {val:#04X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(cgb: bool) -> (Io, Gpu, Mbc) {
        let mbc = Mbc::from_rom(vec![0; 0x8000], cgb).unwrap();
        (Io::new(cgb, false), Gpu::new(cgb, false), mbc)
    }

    #[test]
    fn post_boot_values() {
        let (io, gpu, mbc) = parts(false);
        assert_eq!(io.read(0xFF40, &gpu, &mbc), 0x91);
        assert_eq!(io.read(0xFF41, &gpu, &mbc), 0x85);
        assert_eq!(io.read(0xFF47, &gpu, &mbc), 0xFC);
        assert_eq!(io.read(0xFF46, &gpu, &mbc), 0xFF);
        assert_eq!(io.read(0xFF07, &gpu, &mbc), 0xF8);
        assert_eq!(io.read(0xFF0F, &gpu, &mbc), 0xE1);
        assert_eq!(io.read(0xFF26, &gpu, &mbc), 0xF1);
    }

    #[test]
    fn stat_low_bits_are_read_only() {
        let (mut io, mut gpu, mut mbc) = parts(false);
        io.write(0xFF41, 0xFF, &mut gpu, &mut mbc);
        assert_eq!(io.read(0xFF41, &gpu, &mbc) & 0x78, 0x78);
        io.write(0xFF41, 0x00, &mut gpu, &mut mbc);
        assert_eq!(io.read(0xFF41, &gpu, &mbc) & 0xF8, 0x80);
    }

    #[test]
    fn ly_ignores_writes() {
        let (mut io, mut gpu, mut mbc) = parts(false);
        io.write(0xFF44, 0x42, &mut gpu, &mut mbc);
        assert_eq!(io.read(0xFF44, &gpu, &mbc), 0);
    }

    #[test]
    fn cgb_registers_read_ff_on_dmg() {
        let (mut io, mut gpu, mut mbc) = parts(false);
        io.write(0xFF4F, 0x01, &mut gpu, &mut mbc);
        for addr in [0xFF4D, 0xFF4F, 0xFF55, 0xFF68, 0xFF69, 0xFF70] {
            assert_eq!(io.read(addr, &gpu, &mbc), 0xFF, "{addr:#06X}");
        }
    }

    #[test]
    fn key1_reports_armed_switch() {
        let (mut io, mut gpu, mut mbc) = parts(true);
        io.write(0xFF4D, 0x01, &mut gpu, &mut mbc);
        assert_eq!(io.read(0xFF4D, &gpu, &mbc), 0x7F);
        io.switch_speed();
        assert_eq!(io.read(0xFF4D, &gpu, &mbc), 0xFE);
    }

    #[test]
    fn boot_latch_is_write_once() {
        let mut io = Io::new(false, true);
        let mut gpu = Gpu::new(false, false);
        let mut mbc = Mbc::from_rom(vec![0; 0x8000], false).unwrap();
        io.write(0xFF50, 0x00, &mut gpu, &mut mbc);
        assert!(io.boot_rom_mapped());
        io.write(0xFF50, 0x01, &mut gpu, &mut mbc);
        assert!(!io.boot_rom_mapped());
    }

    #[test]
    fn acknowledge_clears_flag_and_records_time() {
        let (mut io, ..) = parts(false);
        io.set_ie(0x1F);
        io.request(InterruptKind::Timer);
        assert_eq!(io.pending(), 0x05);
        io.acknowledge(InterruptKind::Timer, 1234);
        assert_eq!(io.pending(), 0x01);
        assert_eq!(io.interrupt(InterruptKind::Timer).last_time, 1234);
        assert_eq!(io.interrupt(InterruptKind::Timer).count, 1);
    }

    #[test]
    fn joypad_press_requests_interrupt() {
        let (mut io, mut gpu, mut mbc) = parts(false);
        io.write(0xFF0F, 0x00, &mut gpu, &mut mbc);
        io.write(0xFF00, 0x20, &mut gpu, &mut mbc);
        io.set_inputs(0x04);
        assert_eq!(io.if_reg(), 0x10);
        assert_eq!(io.read(0xFF00, &gpu, &mbc), 0xEB);
    }
}
