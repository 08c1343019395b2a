use serde::{Deserialize, Serialize};

use crate::error::CartridgeError;

/// Images shorter than a full header are treated as bare instruction
/// streams: no controller and a single bank of external RAM.
pub const MIN_HEADER_LEN: usize = 0x150;

const BARE_IMAGE_RAM: usize = 0x2000;
const BARE_IMAGE_ROM: usize = 0x8000;
const BANK0_LEN: usize = 0x4000;

/// Where execution starts once the boot ROM hands over.
pub const ENTRY_POINT: usize = 0x0100;

/// Bare instruction images are loaded at the entry point of an otherwise
/// empty 32KB ROM. Full images are returned unchanged.
pub fn place_image(rom: Vec<u8>) -> Vec<u8> {
    if rom.len() >= MIN_HEADER_LEN {
        return rom;
    }
    let mut image = vec![0; BARE_IMAGE_ROM];
    image[ENTRY_POINT..ENTRY_POINT + rom.len()].copy_from_slice(&rom);
    image
}

/// Controller family selected by the cartridge-type byte at 0x147.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MbcVersion {
    None,
    Mbc1,
    Mbc3,
    Mbc5,
}

/// Fields of the cartridge header consumed at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub cgb: bool,
    pub cart_type: u8,
    pub version: MbcVersion,
    pub has_rtc: bool,
    /// Declared ROM size from 0x148. Informational; banking checks use the
    /// real image length.
    pub rom_size: usize,
    pub ram_size: usize,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl Header {
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.len() < MIN_HEADER_LEN {
            return Ok(Self {
                title: String::new(),
                cgb: false,
                cart_type: 0,
                version: MbcVersion::None,
                has_rtc: false,
                rom_size: rom.len(),
                ram_size: BARE_IMAGE_RAM,
                header_checksum: 0,
                global_checksum: 0,
            });
        }

        if rom.len() < BANK0_LEN {
            return Err(CartridgeError::Truncated(rom.len()));
        }

        let cart_type = rom[0x0147];
        let version = mbc_version(cart_type)?;
        let ram_size = ram_size(rom[0x0149])?;

        let header = Self {
            title: title(rom),
            cgb: rom[0x0143] & 0x80 != 0,
            cart_type,
            version,
            has_rtc: matches!(cart_type, 0x0F | 0x10),
            rom_size: 0x8000usize << (rom[0x0148] & 0x0F).min(8),
            ram_size,
            header_checksum: rom[0x014D],
            global_checksum: ((rom[0x014E] as u16) << 8) | rom[0x014F] as u16,
        };

        let computed = computed_header_checksum(rom);
        if computed != header.header_checksum {
            log::warn!(
                "header checksum mismatch for \"{}\": stored {:#04X}, computed {:#04X}",
                header.title,
                header.header_checksum,
                computed
            );
        }

        Ok(header)
    }
}

fn title(rom: &[u8]) -> String {
    let mut slice = &rom[0x0134..0x0143];
    if let Some(pos) = slice.iter().position(|&b| b == 0) {
        slice = &slice[..pos];
    }
    String::from_utf8_lossy(slice).trim().to_string()
}

fn computed_header_checksum(rom: &[u8]) -> u8 {
    rom[0x0134..=0x014C]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

fn mbc_version(cart_type: u8) -> Result<MbcVersion, CartridgeError> {
    let unsupported = |name| CartridgeError::UnsupportedController {
        code: cart_type,
        name,
    };
    match cart_type {
        0x00 | 0x08 | 0x09 => Ok(MbcVersion::None),
        0x01..=0x03 => Ok(MbcVersion::Mbc1),
        0x0F..=0x13 => Ok(MbcVersion::Mbc3),
        0x19..=0x1E => Ok(MbcVersion::Mbc5),
        0x05 | 0x06 => Err(unsupported("MBC2")),
        0x0B..=0x0D => Err(unsupported("MMM01")),
        0x20 => Err(unsupported("MBC6")),
        0x22 => Err(unsupported("MBC7")),
        0xFC => Err(unsupported("POCKET CAMERA")),
        0xFD => Err(unsupported("TAMA5")),
        0xFE => Err(unsupported("HuC3")),
        0xFF => Err(unsupported("HuC1")),
        other => Err(CartridgeError::UnknownCartridgeType(other)),
    }
}

fn ram_size(code: u8) -> Result<usize, CartridgeError> {
    match code {
        0x00 => Ok(0),
        0x01 => Ok(0x800),   // 2KB
        0x02 => Ok(0x2000),  // 8KB
        0x03 => Ok(0x8000),  // 32KB (4 banks)
        0x04 => Ok(0x20000), // 128KB (16 banks)
        0x05 => Ok(0x10000), // 64KB (8 banks)
        other => Err(CartridgeError::UnknownRamSize(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(cart_type: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0; 0x8000];
        rom[0x0134..0x0139].copy_from_slice(b"TESTS");
        rom[0x0147] = cart_type;
        rom[0x0149] = ram_code;
        rom[0x014D] = computed_header_checksum(&rom);
        rom
    }

    #[test]
    fn parses_title_and_controller() {
        let header = Header::parse(&rom_with(0x1B, 0x03)).unwrap();
        assert_eq!(header.title, "TESTS");
        assert_eq!(header.version, MbcVersion::Mbc5);
        assert_eq!(header.ram_size, 0x8000);
        assert!(!header.cgb);
    }

    #[test]
    fn rtc_only_on_timer_carts() {
        assert!(Header::parse(&rom_with(0x10, 0x03)).unwrap().has_rtc);
        assert!(!Header::parse(&rom_with(0x13, 0x03)).unwrap().has_rtc);
    }

    #[test]
    fn unknown_type_fails_loudly() {
        assert_eq!(
            Header::parse(&rom_with(0x42, 0x00)),
            Err(CartridgeError::UnknownCartridgeType(0x42))
        );
        assert!(matches!(
            Header::parse(&rom_with(0x05, 0x00)),
            Err(CartridgeError::UnsupportedController { code: 0x05, .. })
        ));
    }

    #[test]
    fn unknown_ram_size_fails() {
        assert_eq!(
            Header::parse(&rom_with(0x03, 0x07)),
            Err(CartridgeError::UnknownRamSize(0x07))
        );
    }

    #[test]
    fn image_shorter_than_bank_zero_is_rejected() {
        assert_eq!(
            Header::parse(&vec![0; 0x1000]),
            Err(CartridgeError::Truncated(0x1000))
        );
    }

    #[test]
    fn bare_image_lands_at_entry_point() {
        let image = place_image(vec![0x3E, 0xFF]);
        assert_eq!(image.len(), 0x8000);
        assert_eq!(&image[0x0100..0x0102], &[0x3E, 0xFF]);
        assert_eq!(image[0x0000], 0x00);

        let full = vec![0xAA; 0x8000];
        assert_eq!(place_image(full.clone()), full);
    }

    #[test]
    fn short_images_have_no_controller() {
        let header = Header::parse(&[0x3E, 0xFF, 0xD6, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(header.version, MbcVersion::None);
        assert_eq!(header.ram_size, BARE_IMAGE_RAM);
    }
}
