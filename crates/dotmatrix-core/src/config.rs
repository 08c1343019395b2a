use serde::{Deserialize, Serialize};

use crate::gpu::{DmgPalette, PixelMode};

/// Which hardware to emulate. `Auto` follows the cartridge header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmulationMode {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
}

impl EmulationMode {
    /// Resolve against the header's CGB flag.
    pub fn resolve(self, header_cgb: bool) -> bool {
        match self {
            Self::Auto => header_cgb,
            Self::ForceDmg => false,
            Self::ForceCgb => true,
        }
    }
}

/// What to do when the CPU meets one of the eleven unused opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownOpcodePolicy {
    /// Stop the machine with a diagnostic.
    #[default]
    Stop,
    /// Fire the debug hook and pause with PC on the opcode.
    Trap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "kebab-case")]
pub struct MachineConfig {
    pub emulation_mode: EmulationMode,
    pub pixel_mode: PixelMode,
    pub dmg_palette: DmgPalette,
    pub unknown_opcode: UnknownOpcodePolicy,
    pub verbose_instructions: bool,
    pub verbose_banking: bool,
}
