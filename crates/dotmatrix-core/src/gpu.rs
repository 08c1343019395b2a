use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    interrupts::InterruptKind,
    io::{Io, reg},
};

// Screen resolution used by the Game Boy LCD
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// Scanlines per frame including the ten V-blank lines.
pub const LINES_PER_FRAME: u8 = 154;
/// CPU cycles per frame at normal speed.
pub const FRAME_CYCLES: u32 = 70224;

// Timing constants per LCD mode in CPU cycles at normal speed
const MODE0_CYCLES: u32 = 204; // HBlank
const MODE1_CYCLES: u32 = 456; // One line during VBlank
const MODE2_CYCLES: u32 = 80; // OAM scan
const MODE3_CYCLES: u32 = 172; // Pixel transfer

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

pub const VRAM_BANK_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;
const PAL_RAM_SIZE: usize = 0x40;
const PAL_INDEX_MASK: u8 = 0x3F;
const PAL_AUTO_INCREMENT_BIT: u8 = 0x80;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// VRAM layout constants
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;

const DUMP_MAP_SIZE: usize = 256;
pub const DUMP_TILES_WIDTH: usize = 128;
pub const DUMP_TILES_HEIGHT: usize = 192;

/// LCD mode as reported in STAT bits 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    Oam = 2,
    Transfer = 3,
}

impl Mode {
    const fn cycles(self) -> u32 {
        match self {
            Mode::HBlank => MODE0_CYCLES,
            Mode::VBlank => MODE1_CYCLES,
            Mode::Oam => MODE2_CYCLES,
            Mode::Transfer => MODE3_CYCLES,
        }
    }
}

/// Encoding of the values written to the pixel buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelMode {
    /// DMG: shade 0-3. CGB: 0-31 background, 32-63 object palette entries.
    #[default]
    Palette,
    /// Raw 15-bit BGR colour as stored in palette RAM.
    Rgb15,
    /// `r | g << 8 | b << 16 | 0xFF << 24`, channels expanded to 8 bits.
    Rgba,
}

/// Colour ramp used to present DMG shades in the colour pixel modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DmgPalette {
    #[default]
    Grayscale,
    LighterGreen,
    DarkerGreen,
}

impl DmgPalette {
    /// Shades 0-3 as 15-bit colours.
    pub const fn ramp(self) -> [u16; 4] {
        match self {
            DmgPalette::Grayscale => [0x7FFF, 0x56B5, 0x294A, 0x0000],
            DmgPalette::LighterGreen => [0x6BFC, 0x3B11, 0x29A6, 0x1061],
            DmgPalette::DarkerGreen => [0x06F3, 0x06B1, 0x1986, 0x04E1],
        }
    }
}

/// Expand a 15-bit colour to RGBA with 8-bit channels.
pub fn rgb15_to_rgba(raw: u16) -> u32 {
    let expand = |c: u16| -> u32 {
        let c = (c & 0x1F) as u32;
        (c << 3) | (c >> 2)
    };
    expand(raw) | (expand(raw >> 5) << 8) | (expand(raw >> 10) << 16) | (0xFF << 24)
}

/// What happened during one [`Gpu::simulate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStep {
    /// H-blank periods entered.
    pub hblanks: u32,
    /// The frame completed (line 144 reached).
    pub vblank: bool,
}

/// LCD registers captured at the start of a scanline.
#[derive(Debug, Clone, Copy)]
struct LcdRegs {
    lcdc: u8,
    scy: u8,
    scx: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
}

impl LcdRegs {
    fn capture(io: &Io) -> Self {
        Self {
            lcdc: io.reg(reg::LCDC),
            scy: io.reg(reg::SCY),
            scx: io.reg(reg::SCX),
            bgp: io.reg(reg::BGP),
            obp0: io.reg(reg::OBP0),
            obp1: io.reg(reg::OBP1),
            wy: io.reg(reg::WY),
            wx: io.reg(reg::WX),
        }
    }
}

#[derive(Copy, Clone, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
}

#[derive(Copy, Clone, Default)]
struct BgPixel {
    index: u8,
    palette: u8,
    priority: bool,
}

fn blank_frame() -> Vec<u32> {
    vec![0; SCREEN_WIDTH * SCREEN_HEIGHT]
}

#[inline(always)]
fn dmg_shade(palette: u8, color_id: u8) -> u8 {
    (palette >> (color_id * 2)) & 0x03
}

#[inline(always)]
fn pixel_index(lo: u8, hi: u8, bit: u8) -> u8 {
    (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
}

/// Offset of a tile within a VRAM bank for the addressing mode in LCDC bit 4.
fn tile_data_offset(lcdc: u8, tile: u8) -> usize {
    if lcdc & 0x10 != 0 {
        tile as usize * 16
    } else {
        (0x1000 + tile as i8 as isize * 16) as usize
    }
}

/// Pixel processor: VRAM, OAM, palette RAM and the scanline state machine.
/// LCD control registers live in the I/O block and are read from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gpu {
    vram: Vec<u8>,
    vram_bank: usize,
    #[serde(with = "BigArray")]
    oam: [u8; OAM_SIZE],
    #[serde(with = "BigArray")]
    bg_palette: [u8; PAL_RAM_SIZE],
    #[serde(with = "BigArray")]
    obj_palette: [u8; PAL_RAM_SIZE],
    bcps: u8,
    ocps: u8,

    cgb: bool,
    /// DMG cartridge on CGB hardware: no tile attributes, shades go
    /// through palette RAM.
    dmg_compat: bool,

    scanline: u8,
    mode: Mode,
    mode_clock: u32,
    /// Internal window line counter
    window_line: u8,
    stat_line: bool,
    frame_count: u64,

    pixel_mode: PixelMode,
    dmg_palette: DmgPalette,
    #[serde(skip, default = "blank_frame")]
    pixels: Vec<u32>,
    #[serde(skip)]
    power_event: Option<bool>,
}

impl Gpu {
    pub fn new(cgb: bool, dmg_compat: bool) -> Self {
        Self {
            vram: vec![0; VRAM_BANK_SIZE * 2],
            vram_bank: 0,
            oam: [0; OAM_SIZE],
            bg_palette: [0xFF; PAL_RAM_SIZE],
            obj_palette: [0xFF; PAL_RAM_SIZE],
            bcps: 0,
            ocps: 0,
            cgb,
            dmg_compat: cgb && dmg_compat,
            scanline: 0,
            mode: Mode::VBlank,
            mode_clock: 0,
            window_line: 0,
            stat_line: false,
            frame_count: 0,
            pixel_mode: PixelMode::default(),
            dmg_palette: DmgPalette::default(),
            pixels: blank_frame(),
            power_event: None,
        }
    }

    /// Position left behind by the boot ROM: last V-blank line with LY
    /// already reading 0.
    pub fn apply_boot_state(&mut self) {
        self.scanline = LINES_PER_FRAME - 1;
        self.mode = Mode::VBlank;
        self.mode_clock = 0;
        self.window_line = 0;
        if self.dmg_compat {
            self.apply_dmg_compatibility_palettes();
        }
    }

    /// Load the default CGB palettes used when running a DMG cartridge in
    /// compatibility mode. These values are based on the behavior of the
    /// official boot ROM.
    pub fn apply_dmg_compatibility_palettes(&mut self) {
        const OBJ_PAL: [u16; 4] = [0x7FFF, 0x421F, 0x1CF2, 0x0000];
        const BG_PAL: [u16; 4] = [0x7FFF, 0x1BEF, 0x6180, 0x0000];

        let (obj0, rest) = self.obj_palette.split_at_mut(8);
        let (obj1, _) = rest.split_at_mut(8);
        Self::write_palette(obj0, OBJ_PAL);
        Self::write_palette(obj1, OBJ_PAL);

        let (bg0, _) = self.bg_palette.split_at_mut(8);
        Self::write_palette(bg0, BG_PAL);
    }

    fn write_palette(slice: &mut [u8], pal: [u16; 4]) {
        for (i, &c) in pal.iter().enumerate() {
            slice[i * 2] = (c & 0xFF) as u8;
            slice[i * 2 + 1] = (c >> 8) as u8;
        }
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    /// Whether tiles carry CGB attributes (palette, bank, flips, priority).
    fn color_attrs(&self) -> bool {
        self.cgb && !self.dmg_compat
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Internal line counter, 0-153. LY differs from this on line 153.
    pub fn scanline(&self) -> u8 {
        self.scanline
    }

    pub fn window_line(&self) -> u8 {
        self.window_line
    }

    /// Frames completed since power on.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel_mode(&self) -> PixelMode {
        self.pixel_mode
    }

    pub fn set_pixel_mode(&mut self, mode: PixelMode) {
        self.pixel_mode = mode;
    }

    pub fn set_dmg_palette(&mut self, palette: DmgPalette) {
        self.dmg_palette = palette;
    }

    /// LCD power transitions since the last call, most recent only.
    pub fn take_power_event(&mut self) -> Option<bool> {
        self.power_event.take()
    }

    pub fn vram_bank(&self) -> u8 {
        self.vram_bank as u8
    }

    pub fn set_vram_bank(&mut self, val: u8) {
        if self.cgb {
            self.vram_bank = (val & 0x01) as usize;
        }
    }

    /// CPU-visible VRAM at 0x8000-0x9FFF in the selected bank.
    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[self.vram_bank * VRAM_BANK_SIZE + (addr as usize & 0x1FFF)]
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.vram[self.vram_bank * VRAM_BANK_SIZE + (addr as usize & 0x1FFF)] = val;
    }

    /// Raw VRAM bytes, bank 0 followed by bank 1.
    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    pub fn read_oam(&self, addr: u16) -> u8 {
        self.oam[(addr as usize - 0xFE00) % OAM_SIZE]
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        self.oam[(addr as usize - 0xFE00) % OAM_SIZE] = val;
    }

    pub(crate) fn write_oam_index(&mut self, index: usize, val: u8) {
        self.oam[index] = val;
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn bcps(&self) -> u8 {
        self.bcps | 0x40
    }

    pub fn ocps(&self) -> u8 {
        self.ocps | 0x40
    }

    pub fn set_bcps(&mut self, val: u8) {
        self.bcps = val & (PAL_AUTO_INCREMENT_BIT | PAL_INDEX_MASK);
    }

    pub fn set_ocps(&mut self, val: u8) {
        self.ocps = val & (PAL_AUTO_INCREMENT_BIT | PAL_INDEX_MASK);
    }

    pub fn read_bcpd(&self) -> u8 {
        self.bg_palette[(self.bcps & PAL_INDEX_MASK) as usize]
    }

    pub fn read_ocpd(&self) -> u8 {
        self.obj_palette[(self.ocps & PAL_INDEX_MASK) as usize]
    }

    pub fn write_bcpd(&mut self, val: u8) {
        self.bg_palette[(self.bcps & PAL_INDEX_MASK) as usize] = val;
        Self::step_palette_index(&mut self.bcps);
    }

    pub fn write_ocpd(&mut self, val: u8) {
        self.obj_palette[(self.ocps & PAL_INDEX_MASK) as usize] = val;
        Self::step_palette_index(&mut self.ocps);
    }

    fn step_palette_index(index: &mut u8) {
        if *index & PAL_AUTO_INCREMENT_BIT != 0 {
            *index = PAL_AUTO_INCREMENT_BIT | (index.wrapping_add(1) & PAL_INDEX_MASK);
        }
    }

    /// Background palette entry as a raw 15-bit colour.
    pub fn bg_palette_color(&self, palette: usize, color_id: usize) -> u16 {
        let off = (palette & 7) * 8 + (color_id & 3) * 2;
        u16::from_le_bytes([self.bg_palette[off], self.bg_palette[off + 1]]) & 0x7FFF
    }

    /// Object palette entry as a raw 15-bit colour.
    pub fn obj_palette_color(&self, palette: usize, color_id: usize) -> u16 {
        let off = (palette & 7) * 8 + (color_id & 3) * 2;
        u16::from_le_bytes([self.obj_palette[off], self.obj_palette[off + 1]]) & 0x7FFF
    }

    fn dmg_output(&self, shade: u8) -> u32 {
        let color = self.dmg_palette.ramp()[shade as usize & 3];
        match self.pixel_mode {
            PixelMode::Palette => shade as u32,
            PixelMode::Rgb15 => color as u32,
            PixelMode::Rgba => rgb15_to_rgba(color),
        }
    }

    fn cgb_output(&self, obj: bool, palette: u8, index: u8) -> u32 {
        let raw = if obj {
            self.obj_palette_color(palette as usize, index as usize)
        } else {
            self.bg_palette_color(palette as usize, index as usize)
        };
        match self.pixel_mode {
            PixelMode::Palette => (obj as u32) * 32 + palette as u32 * 4 + index as u32,
            PixelMode::Rgb15 => raw as u32,
            PixelMode::Rgba => rgb15_to_rgba(raw),
        }
    }

    fn bg_output(&self, bgp: u8, palette: u8, index: u8) -> u32 {
        if self.color_attrs() {
            self.cgb_output(false, palette, index)
        } else if self.cgb {
            self.cgb_output(false, 0, dmg_shade(bgp, index))
        } else {
            self.dmg_output(dmg_shade(bgp, index))
        }
    }

    fn obj_output(&self, regs: &LcdRegs, flags: u8, index: u8) -> u32 {
        if self.color_attrs() {
            return self.cgb_output(true, flags & 0x07, index);
        }
        let obp = if flags & 0x10 != 0 { regs.obp1 } else { regs.obp0 };
        let shade = dmg_shade(obp, index);
        if self.cgb {
            self.cgb_output(true, (flags >> 4) & 1, shade)
        } else {
            self.dmg_output(shade)
        }
    }

    fn blank_pixel(&self) -> u32 {
        match self.pixel_mode {
            PixelMode::Palette => 0,
            PixelMode::Rgb15 if self.cgb => 0x7FFF,
            PixelMode::Rgba if self.cgb => rgb15_to_rgba(0x7FFF),
            _ => self.dmg_output(0),
        }
    }

    /// Fill the frame with colour 0.
    pub fn clear_frame(&mut self) {
        let blank = self.blank_pixel();
        self.pixels.fill(blank);
    }

    /// React to LCDC bit 7 changing.
    pub fn set_power(&mut self, on: bool, io: &mut Io) {
        self.scanline = 0;
        self.mode_clock = 0;
        self.window_line = 0;
        self.stat_line = false;
        io.set_reg(reg::LY, 0);
        if on {
            self.mode = Mode::Oam;
        } else {
            self.mode = Mode::VBlank;
            self.clear_frame();
        }
        self.power_event = Some(on);
        self.update_stat(io);
    }

    /// Recompute STAT bits 0-2 and raise the STAT interrupt on a rising
    /// edge of the combined interrupt line.
    pub fn update_stat(&mut self, io: &mut Io) {
        let mut stat = io.reg(reg::STAT) & 0x78;
        if io.reg(reg::LCDC) & 0x80 == 0 {
            io.set_reg(reg::STAT, stat | Mode::VBlank as u8);
            self.stat_line = false;
            return;
        }

        stat |= self.mode as u8;
        let coincidence = io.reg(reg::LY) == io.reg(reg::LYC);
        if coincidence {
            stat |= 0x04;
        }
        io.set_reg(reg::STAT, stat);

        let mode_signal = match self.mode {
            Mode::HBlank => stat & 0x08 != 0,
            Mode::VBlank => stat & 0x10 != 0,
            Mode::Oam => stat & 0x20 != 0,
            Mode::Transfer => false,
        };
        let line = mode_signal || (coincidence && stat & 0x40 != 0);
        if line && !self.stat_line {
            io.request(InterruptKind::LcdStat);
        }
        self.stat_line = line;
    }

    /// Advance the state machine by `cycles` CPU cycles.
    pub fn simulate(&mut self, cycles: u32, io: &mut Io) -> GpuStep {
        let mut step = GpuStep::default();
        if io.reg(reg::LCDC) & 0x80 == 0 {
            return step;
        }

        let factor = if io.double_speed() { 2 } else { 1 };
        self.mode_clock += cycles;
        loop {
            let budget = self.mode.cycles() * factor;
            if self.mode_clock < budget {
                break;
            }
            self.mode_clock -= budget;

            match self.mode {
                Mode::Oam => {
                    self.mode = Mode::Transfer;
                    self.render_scanline(io);
                }
                Mode::Transfer => {
                    self.mode = Mode::HBlank;
                    step.hblanks += 1;
                }
                Mode::HBlank => {
                    self.scanline += 1;
                    if self.scanline as usize == SCREEN_HEIGHT {
                        self.mode = Mode::VBlank;
                        self.frame_count = self.frame_count.wrapping_add(1);
                        io.request(InterruptKind::VBlank);
                        step.vblank = true;
                    } else {
                        self.mode = Mode::Oam;
                    }
                    io.set_reg(reg::LY, self.scanline);
                }
                Mode::VBlank => {
                    self.scanline += 1;
                    if self.scanline == LINES_PER_FRAME {
                        self.scanline = 0;
                        self.window_line = 0;
                        self.mode = Mode::Oam;
                    }
                    // LY reads 0 for most of line 153.
                    let ly = if self.scanline == LINES_PER_FRAME - 1 {
                        0
                    } else {
                        self.scanline
                    };
                    io.set_reg(reg::LY, ly);
                }
            }

            self.update_stat(io);
        }
        step
    }

    fn map_pixel(&self, lcdc: u8, map_base: usize, x: u8, y: u8) -> BgPixel {
        let map_index = map_base + (y as usize / 8) * 32 + x as usize / 8;
        let tile = self.vram[map_index];
        let mut fine_x = x & 7;
        let mut fine_y = (y & 7) as usize;
        let mut px = BgPixel::default();
        let mut bank = 0;
        if self.color_attrs() {
            let attr = self.vram[VRAM_BANK_SIZE + map_index];
            px.palette = attr & 0x07;
            bank = ((attr >> 3) & 0x01) as usize;
            if attr & 0x20 != 0 {
                fine_x = 7 - fine_x;
            }
            if attr & 0x40 != 0 {
                fine_y = 7 - fine_y;
            }
            px.priority = attr & 0x80 != 0;
        }
        let addr = bank * VRAM_BANK_SIZE + tile_data_offset(lcdc, tile) + fine_y * 2;
        px.index = pixel_index(self.vram[addr], self.vram[addr + 1], 7 - fine_x);
        px
    }

    /// Collect up to 10 sprites on `line`, in drawing priority order.
    fn oam_scan(&self, line: u8, height: i16, out: &mut [Sprite; MAX_SPRITES_PER_LINE]) -> usize {
        let mut count = 0;
        for i in 0..TOTAL_SPRITES {
            if count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = self.oam[base] as i16 - 16;
            let ly = line as i16;
            if ly >= y && ly < y + height {
                out[count] = Sprite {
                    x: self.oam[base + 1] as i16 - 8,
                    y,
                    tile: self.oam[base + 2],
                    flags: self.oam[base + 3],
                };
                count += 1;
            }
        }
        if !self.color_attrs() {
            // DMG-style priority: lower X first, OAM order breaks ties
            out[..count].sort_by_key(|s| s.x);
        }
        count
    }

    /// Render the current scanline into the pixel buffer.
    pub fn render_scanline(&mut self, io: &Io) {
        let ly = self.scanline;
        if ly as usize >= SCREEN_HEIGHT {
            return;
        }
        let regs = LcdRegs::capture(io);
        let row = ly as usize * SCREEN_WIDTH;

        let mut bg_index = [0u8; SCREEN_WIDTH];
        let mut bg_priority = [false; SCREEN_WIDTH];

        // On DMG, LCDC bit 0 blanks background and window. On CGB it only
        // drops their priority over sprites.
        let bg_enabled = self.color_attrs() || regs.lcdc & 0x01 != 0;
        let master_priority = !self.color_attrs() || regs.lcdc & 0x01 != 0;

        if bg_enabled {
            let map = if regs.lcdc & 0x08 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };
            let y = ly.wrapping_add(regs.scy);
            for x in 0..SCREEN_WIDTH {
                let px = self.map_pixel(regs.lcdc, map, (x as u8).wrapping_add(regs.scx), y);
                bg_index[x] = px.index;
                bg_priority[x] = px.priority;
                self.pixels[row + x] = self.bg_output(regs.bgp, px.palette, px.index);
            }

            if regs.lcdc & 0x20 != 0 && ly >= regs.wy && regs.wx <= WINDOW_X_MAX {
                let map = if regs.lcdc & 0x40 != 0 {
                    BG_MAP_1_BASE
                } else {
                    BG_MAP_0_BASE
                };
                let start = regs.wx as i16 - 7;
                let y = self.window_line;
                for x in start.max(0) as usize..SCREEN_WIDTH {
                    let wx = (x as i16 - start) as u8;
                    let px = self.map_pixel(regs.lcdc, map, wx, y);
                    bg_index[x] = px.index;
                    bg_priority[x] = px.priority;
                    self.pixels[row + x] = self.bg_output(regs.bgp, px.palette, px.index);
                }
                self.window_line = self.window_line.wrapping_add(1);
            }
        } else {
            let blank = self.bg_output(regs.bgp, 0, 0);
            self.pixels[row..row + SCREEN_WIDTH].fill(blank);
        }

        if regs.lcdc & 0x02 == 0 {
            return;
        }

        let height: i16 = if regs.lcdc & 0x04 != 0 { 16 } else { 8 };
        let mut sprites = [Sprite::default(); MAX_SPRITES_PER_LINE];
        let count = self.oam_scan(ly, height, &mut sprites);
        let mut drawn = [false; SCREEN_WIDTH];
        for s in &sprites[..count] {
            let mut tile = s.tile;
            if height == 16 {
                tile &= 0xFE;
            }
            let mut line = ly as i16 - s.y;
            if s.flags & 0x40 != 0 {
                line = height - 1 - line;
            }
            let bank = if self.color_attrs() {
                ((s.flags >> 3) & 0x01) as usize
            } else {
                0
            };
            let addr = bank * VRAM_BANK_SIZE + tile as usize * 16 + line as usize * 2;
            let lo = self.vram[addr];
            let hi = self.vram[addr + 1];
            for px in 0..8u8 {
                let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                let index = pixel_index(lo, hi, bit);
                if index == 0 {
                    continue;
                }
                let sx = s.x + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                    continue;
                }
                let x = sx as usize;
                // A higher-priority sprite claims the pixel even when hidden.
                drawn[x] = true;
                if master_priority && bg_index[x] != 0 && (bg_priority[x] || s.flags & 0x80 != 0)
                {
                    continue;
                }
                self.pixels[row + x] = self.obj_output(&regs, s.flags, index);
            }
        }
    }

    fn dump_map(&self, io: &Io, map_base: usize) -> Vec<u32> {
        let regs = LcdRegs::capture(io);
        let mut out = vec![0; DUMP_MAP_SIZE * DUMP_MAP_SIZE];
        for y in 0..DUMP_MAP_SIZE {
            for x in 0..DUMP_MAP_SIZE {
                let px = self.map_pixel(regs.lcdc, map_base, x as u8, y as u8);
                out[y * DUMP_MAP_SIZE + x] = self.bg_output(regs.bgp, px.palette, px.index);
            }
        }
        out
    }

    /// 256×256 image of the tile map selected for the background.
    pub fn dump_background(&self, io: &Io) -> Vec<u32> {
        let base = if io.reg(reg::LCDC) & 0x08 != 0 {
            BG_MAP_1_BASE
        } else {
            BG_MAP_0_BASE
        };
        self.dump_map(io, base)
    }

    /// 256×256 image of the tile map selected for the window.
    pub fn dump_window(&self, io: &Io) -> Vec<u32> {
        let base = if io.reg(reg::LCDC) & 0x40 != 0 {
            BG_MAP_1_BASE
        } else {
            BG_MAP_0_BASE
        };
        self.dump_map(io, base)
    }

    /// All 384 tiles of bank 0, 16 per row.
    pub fn dump_tiles(&self, io: &Io) -> Vec<u32> {
        let bgp = io.reg(reg::BGP);
        let mut out = vec![0; DUMP_TILES_WIDTH * DUMP_TILES_HEIGHT];
        for y in 0..DUMP_TILES_HEIGHT {
            for x in 0..DUMP_TILES_WIDTH {
                let tile = (y / 8) * 16 + x / 8;
                let addr = tile * 16 + (y % 8) * 2;
                let index = pixel_index(self.vram[addr], self.vram[addr + 1], 7 - (x % 8) as u8);
                out[y * DUMP_TILES_WIDTH + x] = self.bg_output(bgp, 0, index);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_expands_five_bit_channels() {
        assert_eq!(rgb15_to_rgba(0x7FFF), 0xFFFF_FFFF);
        assert_eq!(rgb15_to_rgba(0x001F), 0xFF00_00FF);
        assert_eq!(rgb15_to_rgba(0x0000), 0xFF00_0000);
        assert_eq!(rgb15_to_rgba(0x7C00), 0xFFFF_0000);
    }

    #[test]
    fn signed_tile_addressing() {
        assert_eq!(tile_data_offset(0x10, 0x80), 0x0800);
        assert_eq!(tile_data_offset(0x00, 0x00), 0x1000);
        assert_eq!(tile_data_offset(0x00, 0x80), 0x0800);
        assert_eq!(tile_data_offset(0x00, 0xFF), 0x0FF0);
    }

    #[test]
    fn palette_index_auto_increments_on_write() {
        let mut gpu = Gpu::new(true, false);
        gpu.set_bcps(0x80 | 0x3F);
        gpu.write_bcpd(0x11);
        assert_eq!(gpu.bcps(), 0xC0);
        gpu.write_bcpd(0x22);
        gpu.set_bcps(0x00);
        assert_eq!(gpu.read_bcpd(), 0x22);
        assert_eq!(gpu.read_bcpd(), 0x22);
        gpu.set_bcps(0x3F);
        assert_eq!(gpu.read_bcpd(), 0x11);
    }

    #[test]
    fn palette_color_is_little_endian() {
        let mut gpu = Gpu::new(true, false);
        gpu.set_ocps(0x80 | 0x0A);
        gpu.write_ocpd(0x1F);
        gpu.write_ocpd(0x7C);
        assert_eq!(gpu.obj_palette_color(1, 1), 0x7C1F);
    }
}
