use serde::{Deserialize, Serialize};

/// CPU cycles between frame-sequencer steps (512 Hz).
const SEQUENCER_PERIOD: u32 = 8192;

/// Sound registers without synthesis. The unit stores what software writes,
/// applies the read-back masks and models the NR52 power switch, which is
/// enough for games that poll sound state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apu {
    /// FF10-FF2F. NR52 lives in `power` and `channels`.
    regs: [u8; 0x20],
    wave_ram: [u8; 0x10],
    power: bool,
    /// NR52 bits 0-3: channels triggered since power-on.
    channels: u8,
    sequencer_step: u8,
    sequencer_clock: u32,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    pub fn new() -> Self {
        Self {
            regs: [0; 0x20],
            wave_ram: [0; 0x10],
            power: false,
            channels: 0,
            sequencer_step: 0,
            sequencer_clock: 0,
        }
    }

    /// State left behind by the boot ROM: sound on, channel 1 having just
    /// played the boot chime.
    pub fn apply_boot_state(&mut self) {
        self.power = true;
        self.channels = 0x01;
        self.regs[0x14] = 0x77; // NR50
        self.regs[0x15] = 0xF3; // NR51
    }

    fn read_mask(addr: u16) -> u8 {
        match addr {
            0xFF10 => 0x80,
            0xFF11 => 0x3F,
            0xFF12 => 0x00,
            0xFF13 => 0xFF,
            0xFF14 => 0xBF,
            0xFF16 => 0x3F,
            0xFF17 => 0x00,
            0xFF18 => 0xFF,
            0xFF19 => 0xBF,
            0xFF1A => 0x7F,
            0xFF1B => 0xFF,
            0xFF1C => 0x9F,
            0xFF1D => 0xFF,
            0xFF1E => 0xBF,
            0xFF20 => 0xFF,
            0xFF21 => 0x00,
            0xFF22 => 0x00,
            0xFF23 => 0xBF,
            0xFF24 => 0x00,
            0xFF25 => 0x00,
            0xFF26 => 0x70,
            _ => 0xFF,
        }
    }

    pub fn enabled(&self) -> bool {
        self.power
    }

    pub fn sequencer_step(&self) -> u8 {
        self.sequencer_step
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF26 => {
                let power = if self.power { 0x80 } else { 0 };
                Self::read_mask(addr) | power | self.channels
            }
            0xFF30..=0xFF3F => self.wave_ram[(addr - 0xFF30) as usize],
            0xFF10..=0xFF2F => self.regs[(addr - 0xFF10) as usize] | Self::read_mask(addr),
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF26 => {
                let on = val & 0x80 != 0;
                if self.power && !on {
                    self.power_off();
                } else if !self.power && on {
                    self.sequencer_step = 0;
                    self.sequencer_clock = 0;
                }
                self.power = on;
            }
            // Wave RAM stays writable with the unit off.
            0xFF30..=0xFF3F => self.wave_ram[(addr - 0xFF30) as usize] = val,
            0xFF10..=0xFF25 if self.power => {
                self.regs[(addr - 0xFF10) as usize] = val;
                if val & 0x80 != 0 {
                    match addr {
                        0xFF14 => self.channels |= 0x01,
                        0xFF19 => self.channels |= 0x02,
                        0xFF1E => self.channels |= 0x04,
                        0xFF23 => self.channels |= 0x08,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn power_off(&mut self) {
        self.regs[..=0x15].fill(0);
        self.channels = 0;
    }

    /// Advance the frame sequencer. Nothing is synthesized.
    pub fn step(&mut self, cycles: u32) {
        if !self.power {
            return;
        }
        self.sequencer_clock += cycles;
        while self.sequencer_clock >= SEQUENCER_PERIOD {
            self.sequencer_clock -= SEQUENCER_PERIOD;
            self.sequencer_step = (self.sequencer_step + 1) & 7;
        }
    }
}
