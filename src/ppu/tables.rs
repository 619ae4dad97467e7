use log::debug;

use super::pixel_format::PixelFormat;
use crate::error::{try_alloc, GfxError, Result};

pub const MAX_BRIGHTNESS: u8 = 15;
pub const DIRECT_COLOUR_PALETTES: usize = 8;

/// Brightness and direct-colour lookup tables. Built as a whole by
/// [`build_direct_colour_maps`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColourTables {
    format: PixelFormat,
    brightness: u8,
    pub black_colour_map: [u16; 256],
    pub direct_colour_maps: [[u16; 256]; DIRECT_COLOUR_PALETTES],
    /// `[brightness][channel]` -> scaled 5-bit channel
    pub mul_brightness: [[u8; 32]; 16],
    /// Sum of two 5-bit channels -> saturated 5-bit channel
    pub brightness_cap: [u8; 64],
}

impl ColourTables {
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Scale a BGR555 word by the master brightness these tables were built for.
    #[inline]
    pub fn screen_colour(&self, bgr: u16) -> u16 {
        let xb = &self.mul_brightness[self.brightness as usize];
        self.format.build_pixel(
            xb[(bgr & 0x1F) as usize],
            xb[((bgr >> 5) & 0x1F) as usize],
            xb[((bgr >> 10) & 0x1F) as usize],
        )
    }

    /// Pack a COLDATA fixed colour (5-bit channels) at the current brightness.
    #[inline]
    pub fn fixed_colour(&self, r: u8, g: u8, b: u8) -> u16 {
        let xb = &self.mul_brightness[self.brightness as usize];
        self.format.build_pixel(
            xb[(r & 0x1F) as usize],
            xb[(g & 0x1F) as usize],
            xb[(b & 0x1F) as usize],
        )
    }

    /// Colour written wherever the colour window clips to black.
    #[inline]
    pub fn black_colour(&self) -> u16 {
        self.black_colour_map[0]
    }

    /// Direct colour: 8-bit index plus the tile's 3 palette bits.
    #[inline]
    pub fn direct_colour(&self, palette: u8, index: u8) -> u16 {
        self.direct_colour_maps[(palette & 7) as usize][index as usize]
    }
}

/// Row 0 is black and row 15 is the identity.
fn build_mul_brightness() -> [[u8; 32]; 16] {
    let mut t = [[0u8; 32]; 16];
    for (b, row) in t.iter_mut().enumerate() {
        for (c, v) in row.iter_mut().enumerate() {
            *v = ((c * b) / MAX_BRIGHTNESS as usize) as u8;
        }
    }
    t
}

fn build_brightness_cap() -> [u8; 64] {
    let mut t = [0u8; 64];
    for (i, v) in t.iter_mut().enumerate() {
        *v = i.min(31) as u8;
    }
    t
}

/// Rebuild every colour table for `format` at `brightness`.
///
/// Deterministic: identical inputs give byte-identical tables. Brightness is
/// the INIDISP nibble, so anything above 15 points at a register bug upstream
/// and is rejected before a frame can use it.
pub fn build_direct_colour_maps(format: PixelFormat, brightness: u8) -> Result<ColourTables> {
    if brightness > MAX_BRIGHTNESS {
        return Err(GfxError::InvalidBrightness(brightness));
    }

    let mul_brightness = build_mul_brightness();
    let xb = &mul_brightness[brightness as usize];

    let mut direct_colour_maps = [[0u16; 256]; DIRECT_COLOUR_PALETTES];
    for (p, map) in direct_colour_maps.iter_mut().enumerate() {
        for (c, v) in map.iter_mut().enumerate() {
            let r = xb[((c & 0x07) << 2) | ((p & 1) << 1)];
            let g = xb[((c & 0x38) >> 1) | (p & 2)];
            let b = xb[((c & 0xC0) >> 3) | (p & 4)];
            *v = format.build_pixel(r, g, b);
        }
    }

    debug!(
        "colour tables rebuilt: format={:?} brightness={}",
        format, brightness
    );

    Ok(ColourTables {
        format,
        brightness,
        black_colour_map: [0; 256],
        direct_colour_maps,
        mul_brightness,
        brightness_cap: build_brightness_cap(),
    })
}

/// Lookup for subtractive halving. Indexed by a biased, halved difference:
/// a channel whose bias bit survived keeps its low bits, any other channel
/// borrowed and becomes zero.
pub fn build_zero_table(format: PixelFormat) -> Result<Vec<u16>> {
    let mut zero = try_alloc("subtract lookup", 0x10000, 0u16)?;
    let green_hi = (format.max_green() + 1) >> 1;
    for r in 0..=31u32 {
        let r2 = if r & 0x10 != 0 { r & !0x10 } else { 0 };
        for g in 0..=format.max_green() {
            let g2 = if g & green_hi != 0 { g & !green_hi } else { 0 };
            for b in 0..=31u32 {
                let b2 = if b & 0x10 != 0 { b & !0x10 } else { 0 };
                let idx = format.build_pixel_native(r, g, b) as usize;
                let val = format.build_pixel_native(r2, g2, b2) as u16;
                zero[idx] = val;
            }
        }
    }
    Ok(zero)
}
