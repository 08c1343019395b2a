//! Flat savestate stream: `b"DMXS"`, a little-endian `u16` format version,
//! then the MessagePack-encoded machine state.
//!
//! ROM bytes are never stored. A digest of the image is kept instead and
//! checked on restore, so a state only loads into a machine built from the
//! same cartridge.

use serde::{Deserialize, Serialize};

use crate::{cpu::Cpu, error::StateError, memory::Memory};

pub const MAGIC: &[u8; 4] = b"DMXS";
pub const VERSION: u16 = 1;

const PREAMBLE_LEN: usize = MAGIC.len() + 2;

/// Identifies a ROM image without storing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomDigest {
    pub len: u64,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl RomDigest {
    pub fn of(rom: &[u8]) -> Self {
        let header_checksum = rom.get(0x014D).copied().unwrap_or(0);
        let global_checksum = match (rom.get(0x014E), rom.get(0x014F)) {
            (Some(&hi), Some(&lo)) => u16::from_be_bytes([hi, lo]),
            _ => 0,
        };
        Self {
            len: rom.len() as u64,
            header_checksum,
            global_checksum,
        }
    }
}

#[derive(Serialize)]
struct StateRef<'a> {
    rom: RomDigest,
    cpu: &'a Cpu,
    memory: &'a Memory,
}

#[derive(Deserialize)]
struct State {
    rom: RomDigest,
    cpu: Cpu,
    memory: Memory,
}

pub fn encode(cpu: &Cpu, memory: &Memory) -> Result<Vec<u8>, StateError> {
    let state = StateRef {
        rom: RomDigest::of(memory.mbc.rom()),
        cpu,
        memory,
    };
    let mut out = Vec::with_capacity(64 * 1024);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend(rmp_serde::to_vec(&state)?);
    Ok(out)
}

/// Decode a state taken with the ROM identified by `expected`. The returned
/// memory has no ROM or boot ROM attached yet.
pub fn decode(bytes: &[u8], expected: RomDigest) -> Result<(Cpu, Memory), StateError> {
    if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(StateError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(StateError::UnsupportedVersion(version));
    }
    let state: State = rmp_serde::from_slice(&bytes[PREAMBLE_LEN..])?;
    if state.rom != expected {
        return Err(StateError::RomMismatch);
    }
    Ok((state.cpu, state.memory))
}
