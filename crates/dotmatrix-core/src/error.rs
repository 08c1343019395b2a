use thiserror::Error;

/// Problems found while parsing a ROM header. These are reported when the
/// machine is constructed and never surface during emulation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("unrecognized cartridge type byte {0:#04X}")]
    UnknownCartridgeType(u8),

    #[error("cartridge type {code:#04X} ({name}) is not supported")]
    UnsupportedController { code: u8, name: &'static str },

    #[error("unrecognized RAM size byte {0:#04X}")]
    UnknownRamSize(u8),

    #[error("ROM image is {0:#X} bytes, shorter than bank 0")]
    Truncated(usize),
}

/// Conditions that stop a running machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("unknown opcode {opcode:#04X} at {pc:#06X}")]
    UnknownOpcode { opcode: u8, pc: u16 },

    #[error("ROM bank {bank} (offset {offset:#X}) is outside the {rom_size:#X}-byte image")]
    RomBankOutOfRange {
        bank: u16,
        offset: usize,
        rom_size: usize,
    },

    #[error("RAM bank {bank} (offset {offset:#X}) is outside {ram_size:#X} bytes of cartridge RAM")]
    RamBankOutOfRange {
        bank: u8,
        offset: usize,
        ram_size: usize,
    },
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("not a savestate (bad magic)")]
    BadMagic,

    #[error("savestate format version {0} is not supported")]
    UnsupportedVersion(u16),

    #[error("savestate was taken with a different ROM")]
    RomMismatch,

    #[error("failed to encode savestate: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode savestate: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
