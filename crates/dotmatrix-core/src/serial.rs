use serde::{Deserialize, Serialize};

use crate::interrupts::InterruptKind;

/// CPU cycles per shifted bit with the internal clock.
const SLOW_CYCLES_PER_BIT: u32 = 512;
const FAST_CYCLES_PER_BIT: u32 = 16;

/// SB/SC with no cable attached: the line reads as all ones, so every
/// completed transfer receives 0xFF. Sent bytes are kept for the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Serial {
    sb: u8,
    sc: u8,
    transfer: Option<TransferState>,
    cgb: bool,
    #[serde(skip)]
    out_buf: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TransferState {
    outgoing: u8,
    remaining_bits: u8,
    cycles_per_bit: u32,
    /// Cycles until the next bit shifts.
    countdown: u32,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: if cgb { 0x7F } else { 0x7E },
            transfer: None,
            cgb,
            out_buf: Vec::new(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => {
                if self.cgb {
                    self.sc | 0x7C
                } else {
                    self.sc | 0x7E
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                self.transfer = None;
                // An external-clock transfer waits for a partner that never
                // clocks, so only the internal clock makes progress.
                if val & 0x81 == 0x81 {
                    let fast = self.cgb && val & 0x02 != 0;
                    let cycles_per_bit = if fast {
                        FAST_CYCLES_PER_BIT
                    } else {
                        SLOW_CYCLES_PER_BIT
                    };
                    self.transfer = Some(TransferState {
                        outgoing: self.sb,
                        remaining_bits: 8,
                        cycles_per_bit,
                        countdown: cycles_per_bit,
                    });
                }
            }
            _ => {}
        }
    }

    pub fn transfer_active(&self) -> bool {
        self.transfer.is_some()
    }

    /// Advance by `cycles` CPU cycles. Returns true when a transfer
    /// completed and requested the serial interrupt in `if_reg`.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) -> bool {
        let Some(state) = self.transfer.as_mut() else {
            return false;
        };

        let mut budget = cycles;
        while budget > 0 {
            let spent = budget.min(state.countdown);
            budget -= spent;
            state.countdown -= spent;
            if state.countdown > 0 {
                break;
            }
            self.sb = (self.sb << 1) | 1;
            state.remaining_bits -= 1;
            if state.remaining_bits == 0 {
                let outgoing = state.outgoing;
                self.transfer = None;
                self.out_buf.push(outgoing);
                self.sc &= 0x7F;
                *if_reg |= InterruptKind::Serial.mask();
                return true;
            }
            state.countdown = state.cycles_per_bit;
        }
        false
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}
