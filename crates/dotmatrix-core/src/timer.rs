use serde::{Deserialize, Serialize};

use crate::interrupts::InterruptKind;

/// Divider and timer unit (gbdev.io/pandocs/Timer_and_Divider_Registers.html).
///
/// DIV is the upper byte of a 16-bit counter advanced once per CPU cycle.
/// TIMA counts falling edges of the counter bit selected by TAC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    pub div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    last_signal: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    /// Returns true when the write caused TIMA to overflow.
    pub fn write(&mut self, addr: u16, val: u8, if_reg: &mut u8) -> bool {
        match addr {
            0xFF04 => {
                self.div = 0;
                self.update_signal(if_reg)
            }
            0xFF05 => {
                self.tima = val;
                false
            }
            0xFF06 => {
                self.tma = val;
                false
            }
            0xFF07 => {
                self.tac = val & 0x07;
                self.update_signal(if_reg)
            }
            _ => false,
        }
    }

    /// Advance the timer by `cycles` CPU cycles, requesting the timer
    /// interrupt in `if_reg` on overflow. Returns true if TIMA overflowed.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) -> bool {
        let mut overflowed = false;
        for _ in 0..cycles {
            self.div = self.div.wrapping_add(1);
            overflowed |= self.update_signal(if_reg);
        }
        overflowed
    }

    fn update_signal(&mut self, if_reg: &mut u8) -> bool {
        let signal = self.signal();
        let falling = self.last_signal && !signal;
        self.last_signal = signal;
        falling && self.increment(if_reg)
    }

    fn increment(&mut self, if_reg: &mut u8) -> bool {
        if self.tima == 0xFF {
            self.tima = self.tma;
            *if_reg |= InterruptKind::Timer.mask();
            true
        } else {
            self.tima += 1;
            false
        }
    }

    fn signal(&self) -> bool {
        if self.tac & 0x04 == 0 {
            return false;
        }
        let bit = match self.tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        (self.div >> bit) & 1 != 0
    }
}
