use serde::{Deserialize, Serialize};

/// The five interrupt sources, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterruptKind {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl InterruptKind {
    pub const ALL: [InterruptKind; 5] = [
        InterruptKind::VBlank,
        InterruptKind::LcdStat,
        InterruptKind::Timer,
        InterruptKind::Serial,
        InterruptKind::Joypad,
    ];

    /// Bit in IE/IF.
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }

    // Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
    pub const fn vector(self) -> u16 {
        match self {
            InterruptKind::VBlank => 0x40,
            InterruptKind::LcdStat => 0x48,
            InterruptKind::Timer => 0x50,
            InterruptKind::Serial => 0x58,
            InterruptKind::Joypad => 0x60,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            InterruptKind::VBlank => "V-blank",
            InterruptKind::LcdStat => "LCD STAT",
            InterruptKind::Timer => "timer",
            InterruptKind::Serial => "serial",
            InterruptKind::Joypad => "joypad",
        }
    }

    /// Highest-priority source set in `pending` (lowest bit wins).
    pub fn highest(pending: u8) -> Option<InterruptKind> {
        let pending = pending & 0x1F;
        if pending == 0 {
            return None;
        }
        Some(Self::ALL[pending.trailing_zeros() as usize])
    }
}

/// Bookkeeping for one interrupt source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    pub kind: InterruptKind,
    /// Master-clock time of the most recent dispatch.
    pub last_time: u64,
    pub count: u64,
}

impl Interrupt {
    pub const fn new(kind: InterruptKind) -> Self {
        Self {
            kind,
            last_time: 0,
            count: 0,
        }
    }

    pub fn table() -> [Interrupt; 5] {
        InterruptKind::ALL.map(Interrupt::new)
    }
}
