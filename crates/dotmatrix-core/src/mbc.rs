use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{Header, MbcVersion},
    error::{CartridgeError, Fault},
    rtc::{RTC_SELECT_FIRST, RTC_SELECT_LAST, Rtc},
};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
pub const WRAM_BANK_SIZE: usize = 0x1000;

const DMG_WRAM_SIZE: usize = 0x2000;
const CGB_WRAM_SIZE: usize = 0x8000;

/// Cartridge address translation plus the internal work RAM, whose upper
/// half is banked through the same offset scheme.
///
/// The ROM image is not part of the serialized state; savestate restore
/// re-attaches the image the machine was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mbc {
    #[serde(skip)]
    rom: Vec<u8>,
    ram: Vec<u8>,
    wram: Vec<u8>,
    version: MbcVersion,
    /// Raw ROM bank register. MBC1 keeps bits 5-6 from the secondary
    /// register here as well.
    rom_bank: u16,
    rom_offset: usize,
    ram_offset: usize,
    wram_offset: usize,
    ram_enabled: bool,
    /// MBC1 mode select: false banks ROM through 0x4000-0x5FFF, true banks RAM.
    ram_banking_mode: bool,
    rtc_enabled: bool,
    rtc_select: Option<u8>,
    rtc: Option<Rtc>,
    latch_armed: bool,
    #[serde(skip)]
    verbose: bool,
    #[serde(skip)]
    fault: Option<Fault>,
}

impl Mbc {
    pub fn new(rom: Vec<u8>, header: &Header, cgb: bool) -> Self {
        let wram_size = if cgb { CGB_WRAM_SIZE } else { DMG_WRAM_SIZE };
        Self {
            rom,
            ram: vec![0; header.ram_size],
            wram: vec![0; wram_size],
            version: header.version,
            rom_bank: 1,
            rom_offset: ROM_BANK_SIZE,
            ram_offset: 0,
            wram_offset: WRAM_BANK_SIZE,
            ram_enabled: header.version == MbcVersion::None,
            ram_banking_mode: false,
            rtc_enabled: false,
            rtc_select: None,
            rtc: header.has_rtc.then(Rtc::new),
            latch_armed: false,
            verbose: false,
            fault: None,
        }
    }

    /// Parse the header and build the controller it names.
    pub fn from_rom(rom: Vec<u8>, cgb: bool) -> Result<Self, CartridgeError> {
        let header = Header::parse(&rom)?;
        Ok(Self::new(rom, &header, cgb))
    }

    pub fn version(&self) -> MbcVersion {
        self.version
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub(crate) fn take_rom(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.rom)
    }

    pub(crate) fn attach_rom(&mut self, rom: Vec<u8>) {
        self.rom = rom;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn rom_bank(&self) -> usize {
        self.rom_offset / ROM_BANK_SIZE
    }

    pub fn ram_bank(&self) -> usize {
        self.ram_offset / RAM_BANK_SIZE
    }

    pub fn wram_bank(&self) -> u8 {
        (self.wram_offset / WRAM_BANK_SIZE) as u8
    }

    pub fn take_fault(&mut self) -> Option<Fault> {
        self.fault.take()
    }

    /// Read from 0x0000-0x7FFF.
    pub fn read(&self, addr: u16) -> u8 {
        let index = match addr {
            0x0000..=0x3FFF => addr as usize,
            _ => self.rom_offset + (addr as usize - ROM_BANK_SIZE),
        };
        self.rom.get(index).copied().unwrap_or(0xFF)
    }

    /// Write to 0x0000-0x7FFF, i.e. the controller registers.
    pub fn write(&mut self, addr: u16, value: u8) {
        match self.version {
            MbcVersion::None => {}
            MbcVersion::Mbc1 => self.write_mbc1(addr, value),
            MbcVersion::Mbc3 => self.write_mbc3(addr, value),
            MbcVersion::Mbc5 => self.write_mbc5(addr, value),
        }
    }

    fn write_mbc1(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.set_ram_enabled(value),
            0x2000..=0x3FFF => {
                self.rom_bank = (self.rom_bank & 0x60) | (value & 0x1F) as u16;
                self.set_rom_bank(self.rom_bank);
            }
            0x4000..=0x5FFF => {
                if self.ram_banking_mode {
                    self.set_ram_bank(value & 0x03);
                } else {
                    self.rom_bank = (self.rom_bank & 0x1F) | (((value & 0x03) as u16) << 5);
                    self.set_rom_bank(self.rom_bank);
                }
            }
            _ => {
                self.ram_banking_mode = value & 0x01 != 0;
                if self.ram_banking_mode {
                    self.rom_bank &= 0x1F;
                    self.set_rom_bank(self.rom_bank);
                } else {
                    self.set_ram_bank(0);
                }
            }
        }
    }

    fn write_mbc3(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.set_ram_enabled(value),
            0x2000..=0x3FFF => {
                self.rom_bank = (value & 0x7F) as u16;
                self.set_rom_bank(self.rom_bank);
            }
            0x4000..=0x5FFF => {
                if self.rtc.is_some() && (RTC_SELECT_FIRST..=RTC_SELECT_LAST).contains(&value) {
                    self.rtc_select = Some(value);
                } else {
                    self.rtc_select = None;
                    self.rtc_enabled = value & 0x80 != 0;
                    self.set_ram_bank(value & 0x07);
                }
            }
            _ => {
                if value == 0x00 {
                    self.latch_armed = true;
                } else {
                    if value == 0x01
                        && self.latch_armed
                        && let Some(rtc) = self.rtc.as_mut()
                    {
                        rtc.latch();
                    }
                    self.latch_armed = false;
                }
            }
        }
    }

    fn write_mbc5(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.set_ram_enabled(value),
            0x2000..=0x2FFF => {
                self.rom_bank = (self.rom_bank & 0x100) | value as u16;
                self.set_rom_bank(self.rom_bank);
            }
            0x3000..=0x3FFF => {
                self.rom_bank = (self.rom_bank & 0x0FF) | (((value & 0x01) as u16) << 8);
                self.set_rom_bank(self.rom_bank);
            }
            0x4000..=0x5FFF => self.set_ram_bank(value & 0x0F),
            _ => {}
        }
    }

    fn set_ram_enabled(&mut self, value: u8) {
        self.ram_enabled = value & 0x0F == 0x0A;
        if self.verbose {
            debug!("cartridge RAM enabled={}", self.ram_enabled);
        }
    }

    /// Map `bank` into 0x4000-0x7FFF. Bank 0 is never reachable here: it
    /// aliases to 1, and on MBC1 so do 0x20/0x40/0x60 (to 0x21/0x41/0x61).
    fn set_rom_bank(&mut self, bank: u16) {
        let mut bank = bank;
        if bank == 0 {
            bank = 1;
        }
        if self.version == MbcVersion::Mbc1 && matches!(bank, 0x20 | 0x40 | 0x60) {
            bank += 1;
        }

        let offset = bank as usize * ROM_BANK_SIZE;
        if offset + ROM_BANK_SIZE > self.rom.len() {
            self.fault = Some(Fault::RomBankOutOfRange {
                bank,
                offset,
                rom_size: self.rom.len(),
            });
            return;
        }
        self.rom_offset = offset;
        if self.verbose {
            debug!("ROM bank {bank} mapped at offset {offset:#X}");
        }
    }

    fn set_ram_bank(&mut self, bank: u8) {
        if self.ram.is_empty() {
            return;
        }
        let banks = self.ram.len().div_ceil(RAM_BANK_SIZE);
        let bank = bank & (banks - 1) as u8;
        let offset = bank as usize * RAM_BANK_SIZE;
        let span = RAM_BANK_SIZE.min(self.ram.len());
        if offset + span > self.ram.len() {
            self.fault = Some(Fault::RamBankOutOfRange {
                bank,
                offset,
                ram_size: self.ram.len(),
            });
            return;
        }
        self.ram_offset = offset;
        if self.verbose {
            debug!("RAM bank {bank} mapped at offset {offset:#X}");
        }
    }

    /// Read from external RAM, 0xA000-0xBFFF.
    pub fn read_ram(&self, addr: u16) -> u8 {
        if !self.ram_enabled {
            return 0xFF;
        }
        if let Some(reg) = self.rtc_select
            && let Some(rtc) = self.rtc.as_ref()
        {
            return rtc.read(reg);
        }
        if self.rtc_enabled {
            return 0xFF;
        }
        self.ram
            .get(self.ram_offset + (addr as usize - 0xA000))
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn write_ram(&mut self, addr: u16, value: u8) {
        if !self.ram_enabled {
            return;
        }
        if let Some(reg) = self.rtc_select
            && let Some(rtc) = self.rtc.as_mut()
        {
            rtc.write(reg, value);
            return;
        }
        if self.rtc_enabled {
            return;
        }
        let index = self.ram_offset + (addr as usize - 0xA000);
        if let Some(byte) = self.ram.get_mut(index) {
            *byte = value;
        }
    }

    /// Read from work RAM, 0xC000-0xDFFF.
    pub fn read_wram(&self, addr: u16) -> u8 {
        match addr {
            0xC000..=0xCFFF => self.wram[(addr - 0xC000) as usize],
            _ => self.wram[self.wram_offset + (addr & 0x0FFF) as usize],
        }
    }

    pub fn write_wram(&mut self, addr: u16, value: u8) {
        match addr {
            0xC000..=0xCFFF => self.wram[(addr - 0xC000) as usize] = value,
            _ => self.wram[self.wram_offset + (addr & 0x0FFF) as usize] = value,
        }
    }

    /// Select the work-RAM bank shown at 0xD000-0xDFFF. Bank 0 selects 1.
    pub fn set_wram_bank(&mut self, value: u8) {
        let bank = match value & 0x07 {
            0 => 1,
            n => n as usize,
        };
        let offset = bank * WRAM_BANK_SIZE;
        if offset + WRAM_BANK_SIZE > self.wram.len() {
            return;
        }
        self.wram_offset = offset;
    }

    pub fn step(&mut self, cycles: u32) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.step(cycles);
        }
    }
}
