use std::{fs::File, io::BufWriter, path::Path};

use dotmatrix_core::gpu::{SCREEN_HEIGHT, SCREEN_WIDTH};

use crate::error::CliError;

/// Unpack RGBA pixels (`r | g << 8 | b << 16 | a << 24`) into bytes.
fn rgba_bytes(pixels: &[u32]) -> Vec<u8> {
    pixels.iter().flat_map(|p| p.to_le_bytes()).collect()
}

/// Write a finished frame as an 8-bit RGBA PNG.
pub fn save_png(path: &Path, pixels: &[u32]) -> Result<(), CliError> {
    let file = File::create(path).map_err(|e| CliError::io(path, e))?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&rgba_bytes(pixels))?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_unpack_in_channel_order() {
        assert_eq!(
            rgba_bytes(&[0xFF33_2211, 0x8000_00FF]),
            vec![0x11, 0x22, 0x33, 0xFF, 0xFF, 0x00, 0x00, 0x80]
        );
    }
}
