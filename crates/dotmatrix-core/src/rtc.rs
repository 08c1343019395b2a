use serde::{Deserialize, Serialize};

/// Emulated CPU cycles per real-time-clock second.
pub const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

/// First and last RTC register selectors written to 0x4000-0x5FFF.
pub const RTC_SELECT_FIRST: u8 = 0x08;
pub const RTC_SELECT_LAST: u8 = 0x0C;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ClockRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl ClockRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 clock. Time advances only with emulated cycles so a run replays
/// identically from a savestate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rtc {
    live: ClockRegisters,
    latched: ClockRegisters,
    subsecond_cycles: u32,
}

impl Rtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latch(&mut self) {
        self.latched = self.live;
    }

    pub fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.live.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.live.minutes = value & 0x3F,
            0x0A => self.live.hours = value & 0x1F,
            0x0B => self.live.days = (self.live.days & 0x0100) | value as u16,
            0x0C => {
                self.live.days = (self.live.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.live.halt = value & 0x40 != 0;
                self.live.carry = value & 0x80 != 0;
            }
            _ => {}
        }
        self.latched = self.live;
    }

    pub fn step(&mut self, cycles: u32) {
        if self.live.halt {
            return;
        }

        let mut sub = self.subsecond_cycles + cycles % RTC_CYCLES_PER_SECOND;
        let mut seconds = (cycles / RTC_CYCLES_PER_SECOND) as u64;
        if sub >= RTC_CYCLES_PER_SECOND {
            sub -= RTC_CYCLES_PER_SECOND;
            seconds += 1;
        }
        self.subsecond_cycles = sub;

        if seconds > 0 {
            self.advance_seconds(seconds);
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute = self.seconds_until_minute_tick();
            if seconds < until_minute {
                self.live.seconds = ((self.live.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute;
            self.live.seconds = 0;
            self.minute_tick();
        }
    }

    // Out-of-range values written by software count up to 63 before wrapping.
    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.live.seconds as u64;
        if sec <= 59 { 60 - sec } else { 64 - sec + 60 }
    }

    fn minute_tick(&mut self) {
        if self.live.minutes == 59 {
            self.live.minutes = 0;
            self.hour_tick();
        } else {
            self.live.minutes = (self.live.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.live.hours == 23 {
            self.live.hours = 0;
            self.day_tick();
        } else {
            self.live.hours = (self.live.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        if self.live.days >= 0x01FF {
            self.live.days = 0;
            self.live.carry = true;
        } else {
            self.live.days += 1;
        }
    }
}
