use std::ops::Range;

use log::warn;
use serde::{Deserialize, Serialize};

const OAM_DMA_LEN: usize = 0xA0;
const OAM_DMA_STARTUP: u32 = 4;
const OAM_DMA_CYCLES_PER_BYTE: u32 = 4;

pub const HDMA_BLOCK_LEN: u16 = 0x10;

/// OAM DMA started by writing the source page to 0xFF46. One byte lands
/// every 4 CPU cycles after a 4-cycle startup; OAM is locked to the CPU
/// for the whole transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OamDma {
    source: u16,
    elapsed: u32,
    copied: usize,
    active: bool,
}

impl OamDma {
    pub fn start(&mut self, page: u8) {
        self.source = (page as u16) << 8;
        // Echo and beyond read through to work RAM.
        if self.source >= 0xE000 {
            self.source -= 0x2000;
        }
        self.elapsed = 0;
        self.copied = 0;
        self.active = true;
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn source(&self) -> u16 {
        self.source
    }

    /// Advance by `cycles`. Returns the OAM indices due for copying.
    pub fn advance(&mut self, cycles: u32) -> Range<usize> {
        if !self.active {
            return 0..0;
        }
        self.elapsed += cycles;
        let due = if self.elapsed <= OAM_DMA_STARTUP {
            0
        } else {
            (((self.elapsed - OAM_DMA_STARTUP) / OAM_DMA_CYCLES_PER_BYTE) as usize).min(OAM_DMA_LEN)
        };
        let range = self.copied..due;
        self.copied = due;
        if due == OAM_DMA_LEN {
            self.active = false;
        }
        range
    }
}

/// CGB VRAM DMA (HDMA1-5). General transfers are queued in full and copied
/// by the memory map right after the FF55 write; H-blank transfers queue
/// one block per H-blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hdma {
    source: u16,
    /// Offset into VRAM, 0x0000-0x1FF0.
    dest: u16,
    /// Blocks still to copy.
    remaining: u8,
    hblank_active: bool,
    /// Blocks due for copying now.
    queued: u8,
}

impl Hdma {
    pub fn hblank_active(&self) -> bool {
        self.hblank_active
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF55 => {
                let blocks = self.remaining.wrapping_sub(1) & 0x7F;
                if self.hblank_active { blocks } else { 0x80 | blocks }
            }
            _ => 0xFF,
        }
    }

    /// `immediate` says whether an H-blank transfer may copy its first
    /// block right away (LCD off, or already in H-blank).
    pub fn write(&mut self, addr: u16, val: u8, immediate: bool) {
        match addr {
            0xFF51 => self.source = ((val as u16) << 8) | (self.source & 0x00F0),
            0xFF52 => self.source = (self.source & 0xFF00) | (val & 0xF0) as u16,
            0xFF53 => self.dest = (((val & 0x1F) as u16) << 8) | (self.dest & 0x00F0),
            0xFF54 => self.dest = (self.dest & 0x1F00) | (val & 0xF0) as u16,
            0xFF55 => {
                if self.hblank_active && val & 0x80 == 0 {
                    warn!(
                        "H-blank DMA cancelled with {} block(s) left",
                        self.remaining
                    );
                    self.hblank_active = false;
                    self.queued = 0;
                    return;
                }
                self.remaining = (val & 0x7F) + 1;
                if val & 0x80 == 0 {
                    self.hblank_active = false;
                    self.queued = self.remaining;
                } else {
                    self.hblank_active = true;
                    self.queued = immediate as u8;
                }
            }
            _ => {}
        }
    }

    pub fn on_hblank(&mut self) {
        if self.hblank_active && self.queued < self.remaining {
            self.queued += 1;
        }
    }

    /// Take the next due block as `(source, vram offset)` and advance the
    /// pointers past it.
    pub fn next_block(&mut self) -> Option<(u16, u16)> {
        if self.queued == 0 || self.remaining == 0 {
            return None;
        }
        let block = (self.source, self.dest);
        self.queued -= 1;
        self.remaining -= 1;
        self.source = self.source.wrapping_add(HDMA_BLOCK_LEN);
        self.dest = (self.dest + HDMA_BLOCK_LEN) & 0x1FF0;
        if self.remaining == 0 {
            self.hblank_active = false;
            self.queued = 0;
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oam_dma_takes_644_cycles() {
        let mut dma = OamDma::default();
        dma.start(0xC1);
        assert_eq!(dma.source(), 0xC100);
        assert_eq!(dma.advance(4), 0..0);
        assert_eq!(dma.advance(4), 0..1);
        assert_eq!(dma.advance(8), 1..3);
        assert!(dma.active());
        assert_eq!(dma.advance(1000), 3..160);
        assert!(!dma.active());
    }

    #[test]
    fn oam_dma_from_echo_reads_wram() {
        let mut dma = OamDma::default();
        dma.start(0xFE);
        assert_eq!(dma.source(), 0xDE00);
    }

    #[test]
    fn general_transfer_queues_all_blocks() {
        let mut hdma = Hdma::default();
        hdma.write(0xFF51, 0xC0, false);
        hdma.write(0xFF52, 0x1F, false);
        hdma.write(0xFF53, 0xFF, false);
        hdma.write(0xFF54, 0xFF, false);
        hdma.write(0xFF55, 0x01, false);

        assert_eq!(hdma.next_block(), Some((0xC010, 0x1FF0)));
        assert_eq!(hdma.next_block(), Some((0xC020, 0x0000)));
        assert_eq!(hdma.next_block(), None);
        assert_eq!(hdma.read(0xFF55), 0xFF);
    }

    #[test]
    fn hblank_transfer_reports_progress_and_cancels() {
        let mut hdma = Hdma::default();
        hdma.write(0xFF55, 0x83, false);
        assert_eq!(hdma.read(0xFF55), 0x03);
        assert_eq!(hdma.next_block(), None);

        hdma.on_hblank();
        assert!(hdma.next_block().is_some());
        assert_eq!(hdma.read(0xFF55), 0x02);

        hdma.write(0xFF55, 0x00, false);
        assert!(!hdma.hblank_active());
        assert_eq!(hdma.read(0xFF55), 0x82);
        hdma.on_hblank();
        assert_eq!(hdma.next_block(), None);
    }
}
