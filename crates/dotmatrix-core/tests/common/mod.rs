//! Synthetic cartridge images and run helpers shared by the integration
//! tests.

#![allow(dead_code)]

use dotmatrix_core::{Machine, MachineConfig, config::EmulationMode};

/// First byte after the cartridge header; test programs start here.
pub const CODE: u16 = 0x0150;

pub struct RomBuilder {
    rom: Vec<u8>,
}

impl RomBuilder {
    /// `banks` 16KB ROM banks (a power of two, at least 2) behind the
    /// controller named by `cart_type`. The entry point jumps to [`CODE`].
    pub fn new(cart_type: u8, banks: usize, ram_code: u8) -> Self {
        let mut rom = vec![0; banks * 0x4000];
        rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
        rom[0x0134..0x013D].copy_from_slice(b"DOTMATRIX");
        rom[0x0147] = cart_type;
        rom[0x0148] = banks.trailing_zeros().saturating_sub(1) as u8;
        rom[0x0149] = ram_code;
        Self { rom }
    }

    /// Plain 32KB ROM without a controller.
    pub fn plain() -> Self {
        Self::new(0x00, 2, 0x00)
    }

    pub fn cgb(mut self) -> Self {
        self.rom[0x0143] = 0x80;
        self
    }

    /// Program bytes at [`CODE`].
    pub fn code(self, bytes: &[u8]) -> Self {
        self.at(CODE as usize, bytes)
    }

    pub fn at(mut self, addr: usize, bytes: &[u8]) -> Self {
        self.rom[addr..addr + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Stamp the first byte of every switchable bank with its number.
    pub fn tag_banks(mut self) -> Self {
        for bank in 1..self.rom.len() / 0x4000 {
            self.rom[bank * 0x4000] = bank as u8;
        }
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let checksum = self.rom[0x0134..=0x014C]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1));
        self.rom[0x014D] = checksum;
        self.rom
    }
}

pub fn machine(rom: Vec<u8>) -> Machine {
    Machine::new(rom).expect("test ROM should load")
}

pub fn cgb_machine(rom: Vec<u8>) -> Machine {
    let config = MachineConfig {
        emulation_mode: EmulationMode::ForceCgb,
        ..MachineConfig::default()
    };
    Machine::with_config(rom, config).expect("test ROM should load")
}

/// Run until PC reaches `pc`, failing after `limit` instructions.
pub fn run_to(m: &mut Machine, pc: u16, limit: usize) {
    for _ in 0..limit {
        if m.cpu().regs.pc == pc {
            return;
        }
        assert!(m.is_running(), "machine stopped: {:?}", m.diagnostic());
        m.simulate();
    }
    panic!("PC never reached {pc:#06X}, at {:#06X}", m.cpu().regs.pc);
}

pub fn run_instructions(m: &mut Machine, count: usize) {
    for _ in 0..count {
        m.simulate();
    }
}
