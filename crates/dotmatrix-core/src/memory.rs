use log::debug;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    breakpoints::Breakpoints,
    dma::HDMA_BLOCK_LEN,
    error::Fault,
    gpu::{Gpu, Mode},
    io::Io,
    mbc::Mbc,
};

/// CPU cycles charged per 16-byte VRAM DMA block at normal speed.
const HDMA_BLOCK_STALL: u32 = 32;

/// Size of a CGB boot ROM, which also overlays 0x0200-0x08FF.
const CGB_BOOT_ROM_LEN: usize = 0x900;

/// What happened while the memory-side hardware advanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub vblank: bool,
    pub timer_overflow: bool,
    pub serial_complete: bool,
    pub hblanks: u32,
}

/// The CPU's view of the 16-bit address space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub mbc: Mbc,
    pub io: Io,
    pub gpu: Gpu,
    #[serde(with = "BigArray")]
    hram: [u8; 0x7F],
    #[serde(skip)]
    boot_rom: Vec<u8>,
    #[serde(skip)]
    pub breakpoints: Breakpoints,
    /// Cycles the CPU owes to VRAM DMA.
    stall: u32,
}

impl Memory {
    /// `boot_rom` of `None` starts from the post-boot hardware state.
    pub fn new(mbc: Mbc, cgb: bool, dmg_compat: bool, boot_rom: Option<Vec<u8>>) -> Self {
        let mut gpu = Gpu::new(cgb, dmg_compat);
        if boot_rom.is_none() {
            gpu.apply_boot_state();
        }
        Self {
            mbc,
            io: Io::new(cgb, boot_rom.is_some()),
            gpu,
            hram: [0; 0x7F],
            boot_rom: boot_rom.unwrap_or_default(),
            breakpoints: Breakpoints::default(),
            stall: 0,
        }
    }

    pub(crate) fn take_boot_rom(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.boot_rom)
    }

    pub(crate) fn attach_boot_rom(&mut self, boot_rom: Vec<u8>) {
        self.boot_rom = boot_rom;
    }

    fn boot_overlay(&self, addr: u16) -> Option<u8> {
        if !self.io.boot_rom_mapped() {
            return None;
        }
        let in_range = match addr {
            0x0000..=0x00FF => true,
            0x0200..=0x08FF => self.boot_rom.len() >= CGB_BOOT_ROM_LEN,
            _ => false,
        };
        if in_range {
            self.boot_rom.get(addr as usize).copied()
        } else {
            None
        }
    }

    /// VRAM is owned by the pixel pipeline during mode 3.
    pub fn vram_locked(&self) -> bool {
        self.io.lcd_enabled() && self.gpu.mode() == Mode::Transfer
    }

    pub fn oam_locked(&self) -> bool {
        self.io.oam_dma.active()
    }

    /// Read without side effects or breakpoint checks.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self
                .boot_overlay(addr)
                .unwrap_or_else(|| self.mbc.read(addr)),
            0x8000..=0x9FFF => {
                if self.vram_locked() {
                    0xFF
                } else {
                    self.gpu.read_vram(addr)
                }
            }
            0xA000..=0xBFFF => self.mbc.read_ram(addr),
            0xC000..=0xDFFF => self.mbc.read_wram(addr),
            0xE000..=0xFDFF => self.mbc.read_wram(addr - 0x2000),
            0xFE00..=0xFE9F => {
                if self.oam_locked() {
                    0xFF
                } else {
                    self.gpu.read_oam(addr)
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.io.read(addr, &self.gpu, &self.mbc),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.io.ie(),
        }
    }

    pub fn read8(&mut self, addr: u16) -> u8 {
        let value = self.peek(addr);
        self.breakpoints.note_read(addr, value);
        value
    }

    pub fn write8(&mut self, addr: u16, val: u8) {
        self.breakpoints.note_write(addr, val);
        match addr {
            0x0000..=0x7FFF => self.mbc.write(addr, val),
            0x8000..=0x9FFF => {
                if self.vram_locked() {
                    #[cfg(feature = "ppu-trace")]
                    log::trace!(
                        "VRAM write blocked addr={addr:04X} val={val:02X} bank={}",
                        self.gpu.vram_bank()
                    );
                } else {
                    self.gpu.write_vram(addr, val);
                }
            }
            0xA000..=0xBFFF => self.mbc.write_ram(addr, val),
            0xC000..=0xDFFF => self.mbc.write_wram(addr, val),
            0xE000..=0xFDFF => self.mbc.write_wram(addr - 0x2000, val),
            0xFE00..=0xFE9F => {
                if !self.oam_locked() {
                    self.gpu.write_oam(addr, val);
                }
            }
            0xFEA0..=0xFEFF => debug!("write to unusable area {addr:#06X} = {val:#04X}"),
            0xFF00..=0xFF7F => {
                self.io.write(addr, val, &mut self.gpu, &mut self.mbc);
                if addr == 0xFF55 {
                    self.run_vram_dma();
                }
            }
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.io.set_ie(val),
        }
    }

    /// Little-endian 16-bit read, low byte first.
    pub fn read16(&mut self, addr: u16) -> u16 {
        let lo = self.read8(addr);
        let hi = self.read8(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    pub fn write16(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write8(addr, lo);
        self.write8(addr.wrapping_add(1), hi);
    }

    /// Source-side read for the DMA engines, which bypass the CPU locks.
    fn dma_read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF => self.gpu.read_vram(addr),
            0xE000..=0xFFFF => self.mbc.read_wram(0xC000 | (addr & 0x1FFF)),
            _ => self.peek(addr),
        }
    }

    /// Copy every due VRAM DMA block and charge the CPU for it.
    fn run_vram_dma(&mut self) {
        let cost = if self.io.double_speed() {
            HDMA_BLOCK_STALL * 2
        } else {
            HDMA_BLOCK_STALL
        };
        while let Some((src, dst)) = self.io.hdma.next_block() {
            for i in 0..HDMA_BLOCK_LEN {
                let byte = self.dma_read(src.wrapping_add(i));
                self.gpu.write_vram(0x8000 | ((dst + i) & 0x1FFF), byte);
            }
            self.stall += cost;
        }
    }

    /// Advance timers, DMA, the pixel processor and the cartridge clock by
    /// `cycles` CPU cycles.
    pub fn simulate(&mut self, cycles: u32) -> StepOutcome {
        let io_step = self.io.simulate(cycles);

        // The cartridge clock runs in real time.
        let real = if self.io.double_speed() {
            cycles / 2
        } else {
            cycles
        };
        self.mbc.step(real);

        for index in self.io.oam_dma.advance(cycles) {
            let byte = self.dma_read(self.io.oam_dma.source() + index as u16);
            self.gpu.write_oam_index(index, byte);
        }

        let gpu_step = self.gpu.simulate(cycles, &mut self.io);
        if gpu_step.hblanks > 0 {
            for _ in 0..gpu_step.hblanks {
                self.io.hdma.on_hblank();
            }
            self.run_vram_dma();
        }

        StepOutcome {
            vblank: gpu_step.vblank,
            timer_overflow: io_step.timer_overflow,
            serial_complete: io_step.serial_complete,
            hblanks: gpu_step.hblanks,
        }
    }

    pub fn take_stall(&mut self) -> u32 {
        std::mem::take(&mut self.stall)
    }

    pub fn take_fault(&mut self) -> Option<Fault> {
        self.mbc.take_fault()
    }

    pub fn set_inputs(&mut self, mask: u8) {
        self.io.set_inputs(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(cgb: bool) -> Memory {
        let mbc = Mbc::from_rom(vec![0; 0x8000], cgb).unwrap();
        Memory::new(mbc, cgb, false, None)
    }

    #[test]
    fn echo_mirrors_work_ram() {
        let mut mem = memory(false);
        mem.write8(0xC123, 0x5A);
        assert_eq!(mem.read8(0xE123), 0x5A);
        mem.write8(0xFDFF, 0xA5);
        assert_eq!(mem.read8(0xDDFF), 0xA5);
    }

    #[test]
    fn unusable_area_reads_ff() {
        let mut mem = memory(false);
        mem.write8(0xFEA0, 0x12);
        assert_eq!(mem.read8(0xFEA0), 0xFF);
        assert_eq!(mem.read8(0xFEFF), 0xFF);
    }

    #[test]
    fn sixteen_bit_access_is_little_endian() {
        let mut mem = memory(false);
        mem.write16(0xC000, 0xBEEF);
        assert_eq!(mem.read8(0xC000), 0xEF);
        assert_eq!(mem.read8(0xC001), 0xBE);
        assert_eq!(mem.read16(0xC000), 0xBEEF);
    }

    #[test]
    fn ie_lives_at_ffff() {
        let mut mem = memory(false);
        mem.write8(0xFFFF, 0x15);
        assert_eq!(mem.io.ie(), 0x15);
        assert_eq!(mem.read8(0xFFFF), 0x15);
    }

    #[test]
    fn boot_rom_overlays_until_latched_off() {
        let mut rom = vec![0; 0x8000];
        rom[0x0000] = 0xAA;
        rom[0x0100] = 0xBB;
        let mbc = Mbc::from_rom(rom, false).unwrap();
        let mut boot = vec![0; 0x100];
        boot[0] = 0x31;
        let mut mem = Memory::new(mbc, false, false, Some(boot));

        assert_eq!(mem.read8(0x0000), 0x31);
        assert_eq!(mem.read8(0x0100), 0xBB);
        mem.write8(0xFF50, 0x01);
        assert_eq!(mem.read8(0x0000), 0xAA);
    }

    #[test]
    fn svbk_switches_upper_work_ram() {
        let mut mem = memory(true);
        mem.write8(0xD000, 0x11);
        mem.write8(0xFF70, 0x03);
        assert_eq!(mem.read8(0xFF70), 0xFB);
        assert_eq!(mem.read8(0xD000), 0x00);
        mem.write8(0xD000, 0x33);
        mem.write8(0xFF70, 0x00);
        assert_eq!(mem.read8(0xD000), 0x11);
    }
}
